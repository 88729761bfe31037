//! メールボックス連携モジュール
//!
//! スレッドの取得・組み立て（fetcher）、返信の送信（composer）、
//! プロバイダAPIのHTTPクライアント（client）を提供する。

pub mod client;
pub mod composer;
pub mod fetcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// clientモジュールから公開されている型をre-export
pub use client::{
    build_auth_url, HttpMailboxClient, MailboxEndpoints, MailboxProfile, MessagePart,
    MessagePartBody, MessagePartHeader, RawMessage, RawThread, TokenResponse,
};
pub use composer::ReplyComposer;
pub use fetcher::ThreadFetcher;

/// 取得済みメッセージ（取得後は不変）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    /// In-Reply-To / References ヘッダーを持つ場合にtrue
    pub is_reply: bool,
}

/// メッセージ列から導出されるスレッド
///
/// `messages` はパース後の日時で降順（最新が先頭）。`subject` と
/// `last_message_date` は先頭メッセージの値。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailThread {
    pub id: String,
    pub subject: String,
    pub messages: Vec<EmailMessage>,
    pub last_message_date: DateTime<Utc>,
}
