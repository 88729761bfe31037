//! スレッドへの返信送信
//!
//! 返信対象スレッドの最終メッセージからヘッダーを読み取り、正しく
//! スレッド化されたRFC 822形式の返信を組み立てて送信する。

use crate::error::{AppError, AppResult};
use crate::logic::reply_logic::{self, ReplySource};
use crate::logic::thread_logic;
use crate::mailbox_client::MailboxApi;
use crate::repository::{
    EmailReply, ReplyRepository, SuggestedAction, SummaryRepository, TokenRepository,
};
use crate::token_manager::TokenManager;
use std::sync::Arc;

/// 返信送信コンポーネント
///
/// 型パラメータ:
/// - `M`: メールボックスAPIクライアント
/// - `R`: トークンリポジトリ
pub struct ReplyComposer<M, R>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
{
    mailbox: Arc<M>,
    token_manager: Arc<TokenManager<M, R>>,
}

impl<M, R> ReplyComposer<M, R>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
{
    pub fn new(mailbox: Arc<M>, token_manager: Arc<TokenManager<M, R>>) -> Self {
        Self {
            mailbox,
            token_manager,
        }
    }

    /// スレッドへ返信を送信する
    ///
    /// 返信対象はプロバイダの並び順で**最後**のメッセージ。宛先はその
    /// From、件名は "Re: " + 元件名、In-Reply-To は元の Message-ID、
    /// References は元の値（無ければ Message-ID）。
    ///
    /// # Errors
    /// - スレッドにメッセージが無い場合は `AppError::NotFound`
    /// - 送信失敗は伝播する（返信ログは送信確認後にのみ記録されるため、
    ///   失敗時にログ行が残ることはない）
    pub async fn send_reply(
        &self,
        user_id: &str,
        thread_id: &str,
        message_text: &str,
    ) -> AppResult<()> {
        if thread_id.trim().is_empty() {
            return Err(AppError::Validation("thread_id is required".to_string()));
        }
        if message_text.trim().is_empty() {
            return Err(AppError::Validation("message is required".to_string()));
        }

        let token = self.token_manager.ensure_valid(user_id).await?;

        let thread = self.mailbox.get_thread(&token.access_token, thread_id).await?;
        let messages = thread.messages.unwrap_or_default();
        let last_message = messages.last().ok_or_else(|| {
            AppError::NotFound(format!("Thread {thread_id} has no messages"))
        })?;

        let headers = last_message
            .payload
            .as_ref()
            .and_then(|p| p.headers.as_deref())
            .unwrap_or(&[]);

        let source = ReplySource {
            from: thread_logic::get_header(headers, "From"),
            subject: thread_logic::get_header(headers, "Subject"),
            message_id: thread_logic::get_header(headers, "Message-ID"),
            references: thread_logic::get_header(headers, "References"),
        };

        let text = reply_logic::compose_reply_text(&source, message_text);
        let raw = reply_logic::encode_raw_message(&text);

        self.mailbox
            .send_raw(&token.access_token, &raw, thread_id)
            .await
    }

    /// 返信を送信し、送信確認後に返信ログとサマリー状態を更新する
    ///
    /// 記録は送信成功後にのみ行う。返信ログの追記後、対応するサマリーの
    /// 推奨アクションを Replied に更新する（サマリーが無い場合は何もしない）。
    pub async fn send_and_record(
        &self,
        replies: &dyn ReplyRepository,
        summaries: &dyn SummaryRepository,
        user_id: &str,
        thread_id: &str,
        message_text: &str,
    ) -> AppResult<EmailReply> {
        self.send_reply(user_id, thread_id, message_text).await?;

        let reply = replies.append_reply(thread_id, user_id, message_text).await?;

        summaries
            .update_suggested_action(thread_id, user_id, SuggestedAction::Replied)
            .await?;

        log::info!("Recorded reply {} for thread {thread_id}", reply.id);
        Ok(reply)
    }
}
