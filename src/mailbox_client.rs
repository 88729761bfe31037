//! メールボックスAPIクライアントのトレイト定義とモック対応
//!
//! このモジュールはメールボックスプロバイダのAPI操作を抽象化し、
//! テスト時にモック可能にします。

use crate::error::AppResult;
use crate::mailbox::client::{MailboxProfile, RawThread, TokenResponse};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// メールボックスプロバイダのAPI操作を抽象化するトレイト
///
/// 本番環境ではREST APIを呼び出す `HttpMailboxClient` を使用し、
/// テスト環境ではモックを使用してテストできます。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// 検索クエリに一致するスレッドIDの一覧を取得（最大 `limit` 件）
    async fn list_thread_ids(
        &self,
        access_token: &str,
        limit: u32,
        query: &str,
    ) -> AppResult<Vec<String>>;

    /// スレッドの全メッセージ（ヘッダー・MIMEパートツリー込み）を取得
    async fn get_thread(&self, access_token: &str, thread_id: &str) -> AppResult<RawThread>;

    /// base64urlエンコード済みのrawメッセージを既存スレッド宛てに送信
    async fn send_raw(&self, access_token: &str, raw: &str, thread_id: &str) -> AppResult<()>;

    /// 認可コードをトークンに交換
    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse>;

    /// リフレッシュトークンでアクセストークンを再取得
    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenResponse>;

    /// アクセストークンに紐づくアカウントのプロフィールを取得
    async fn get_profile(&self, access_token: &str) -> AppResult<MailboxProfile>;
}
