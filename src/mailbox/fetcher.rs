//! 受信トレイのスレッド取得
//!
//! スレッドIDの一覧取得 → スレッドごとの詳細取得（1件につき1往復）→
//! MIMEデコードとドメイン型への組み立てを行う。

use crate::error::AppResult;
use crate::logic::thread_logic;
use crate::mailbox::EmailThread;
use crate::mailbox_client::MailboxApi;
use crate::repository::TokenRepository;
use crate::token_manager::TokenManager;
use std::sync::Arc;

/// 一覧取得を受信トレイに限定するクエリ
const INBOX_QUERY: &str = "in:inbox";

/// スレッド取得コンポーネント
///
/// 型パラメータ:
/// - `M`: メールボックスAPIクライアント
/// - `R`: トークンリポジトリ
pub struct ThreadFetcher<M, R>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
{
    mailbox: Arc<M>,
    token_manager: Arc<TokenManager<M, R>>,
}

impl<M, R> ThreadFetcher<M, R>
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

    /// 受信トレイのスレッドを最終メッセージ日時の降順で取得する
    ///
    /// スレッド詳細は1件ずつ順次取得する（プロバイダのレート制限を考慮し、
    /// 内部でのファンアウトは行わない）。一覧・詳細いずれかのAPIエラーは
    /// 呼び出し全体を失敗させる（部分的な一覧は返さない）。ただし
    /// パースできないメッセージ・スレッドは警告ログの上スキップする。
    pub async fn list_threads(&self, user_id: &str, limit: u32) -> AppResult<Vec<EmailThread>> {
        let token = self.token_manager.ensure_valid(user_id).await?;

        let thread_ids = self
            .mailbox
            .list_thread_ids(&token.access_token, limit, INBOX_QUERY)
            .await?;

        let mut threads: Vec<EmailThread> = Vec::with_capacity(thread_ids.len());
        for thread_id in thread_ids {
            let raw = self.mailbox.get_thread(&token.access_token, &thread_id).await?;
            if let Some(thread) = thread_logic::build_thread(&raw) {
                threads.push(thread);
            }
        }

        thread_logic::sort_threads(&mut threads);

        log::info!(
            "Fetched {} thread(s) for user {user_id} (limit: {limit})",
            threads.len()
        );
        Ok(threads)
    }
}
