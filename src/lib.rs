//! AIメールアシスタントのバックエンドコア
//!
//! メールボックスプロバイダのAPI・AI要約・永続化を統合し、スレッド要約・
//! 返信送信・デイリーダイジェスト配信を提供する。HTTPルーティング層は
//! このクレートの外にあり、ここでは型付きの操作とエラー分類のみを公開する。

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

pub mod config;
pub mod digest;
pub mod error;
pub mod logic;
pub mod mailbox;
pub mod mailbox_client;
pub mod repository;
pub mod summarizer;
pub mod token_manager;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// データベース接続プールを作成する
pub async fn create_pool(database_url: &str) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Provider(format!("Invalid database URL: {e}")))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to connect to database: {e}")))
}
