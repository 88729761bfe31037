//! リポジトリパターンによるDB操作の抽象化
//!
//! トークン・スレッドサマリー・返信ログのDB操作を抽象化し、テスト時に
//! モック可能にします。
//!
//! # セキュリティガイドライン
//! - access_token / refresh_token の値をログに出力しないこと
//! - ログに出力できるのはユーザーID、件数などの識別・統計情報のみ

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

/// 緊急度（High > Medium > Low）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// ダイジェストの並び順（High=0 が先頭）
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    /// 文字列からパース。未知の値はNone
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// サマリーに対する推奨アクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestedAction {
    Reply,
    FollowUp,
    ReadLater,
    Archive,
    Forward,
    /// 返信済み（ダイジェスト対象外）
    Replied,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "Reply",
            Self::FollowUp => "Follow Up",
            Self::ReadLater => "Read Later",
            Self::Archive => "Archive",
            Self::Forward => "Forward",
            Self::Replied => "Replied",
        }
    }

    /// 文字列からパース。未知の値はNone
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "reply" => Some(Self::Reply),
            "follow up" => Some(Self::FollowUp),
            "read later" => Some(Self::ReadLater),
            "archive" => Some(Self::Archive),
            "forward" => Some(Self::Forward),
            "replied" => Some(Self::Replied),
            _ => None,
        }
    }
}

/// ユーザーのOAuthトークン（user_idごとに1行）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserToken {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub token_type: String,
    /// 失効日時（エポックミリ秒）。リフレッシュのたびに単調非減少
    pub expiry_date: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// トークンupsert用の入力（タイムスタンプはリポジトリ側で付与）
#[derive(Debug, Clone)]
pub struct UpsertUserToken {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub token_type: String,
    pub expiry_date: i64,
}

/// スレッドの要約（(thread_id, user_id) で一意）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub subject: String,
    pub summary: String,
    pub urgency: Urgency,
    pub suggested_action: SuggestedAction,
    pub created_at: String,
    pub updated_at: String,
}

/// サマリーupsert用の入力
#[derive(Debug, Clone)]
pub struct UpsertThreadSummary {
    pub thread_id: String,
    pub user_id: String,
    pub subject: String,
    pub summary: String,
    pub urgency: Urgency,
    pub suggested_action: SuggestedAction,
}

/// 送信済み返信のログ行（追記専用）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailReply {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub message: String,
    pub sent_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// トークン関連のDB操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// ユーザーのトークンを取得。存在しない場合はNone
    async fn get_token(&self, user_id: &str) -> AppResult<Option<UserToken>>;

    /// トークンをupsert（キー = user_id）。保存後の行を返す
    async fn upsert_token(&self, token: UpsertUserToken) -> AppResult<UserToken>;

    /// ユーザーのトークンを削除（ログアウト）
    async fn delete_token(&self, user_id: &str) -> AppResult<()>;

    /// トークンを保持する全ユーザーを取得（ダイジェスト対象の列挙）
    async fn list_tokens(&self) -> AppResult<Vec<UserToken>>;
}

/// スレッドサマリー関連のDB操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// サマリーをupsert（キー = (thread_id, user_id)）。保存後の行を返す
    async fn upsert_summary(&self, summary: UpsertThreadSummary) -> AppResult<ThreadSummary>;

    /// ユーザーのサマリーを作成日時降順で取得
    async fn get_summaries_for_user(&self, user_id: &str) -> AppResult<Vec<ThreadSummary>>;

    /// ID指定でサマリーを取得。存在しない場合はNone
    async fn get_summary_by_id(&self, id: &str) -> AppResult<Option<ThreadSummary>>;

    /// (thread_id, user_id) 指定でサマリーを取得。存在しない場合はNone
    async fn get_summary_by_thread(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ThreadSummary>>;

    /// サマリーの推奨アクションのみ更新（返信後の Replied 反映に使用）
    async fn update_suggested_action(
        &self,
        thread_id: &str,
        user_id: &str,
        action: SuggestedAction,
    ) -> AppResult<()>;
}

/// 返信ログ関連のDB操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReplyRepository: Send + Sync {
    /// 返信ログを追記。保存した行を返す
    async fn append_reply(
        &self,
        thread_id: &str,
        user_id: &str,
        message: &str,
    ) -> AppResult<EmailReply>;

    /// スレッドの返信ログを送信日時降順で取得
    async fn get_replies_for_thread(&self, thread_id: &str) -> AppResult<Vec<EmailReply>>;

    /// ユーザーの返信ログを送信日時降順で取得
    async fn get_replies_for_user(&self, user_id: &str) -> AppResult<Vec<EmailReply>>;
}

/// 初期スキーマを適用する
pub async fn init_schema(pool: &SqlitePool) -> AppResult<()> {
    sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
        .execute(pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to apply schema: {e}")))?;
    Ok(())
}

/// SQLiteを使用したTokenRepositoryの実装
pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn get_token(&self, user_id: &str) -> AppResult<Option<UserToken>> {
        sqlx::query_as::<_, UserToken>(
            r#"
            SELECT user_id, email, access_token, refresh_token, scope, token_type,
                   expiry_date, created_at, updated_at
            FROM user_tokens
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get user token: {e}")))
    }

    async fn upsert_token(&self, token: UpsertUserToken) -> AppResult<UserToken> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO user_tokens
                (user_id, email, access_token, refresh_token, scope, token_type,
                 expiry_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                email = excluded.email,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                scope = excluded.scope,
                token_type = excluded.token_type,
                expiry_date = excluded.expiry_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&token.user_id)
        .bind(&token.email)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.scope)
        .bind(&token.token_type)
        .bind(token.expiry_date)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to save user token: {e}")))?;

        self.get_token(&token.user_id).await?.ok_or_else(|| {
            AppError::Provider("Failed to save user token: row missing after upsert".to_string())
        })
    }

    async fn delete_token(&self, user_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM user_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Provider(format!("Failed to delete user token: {e}")))?;
        Ok(())
    }

    async fn list_tokens(&self) -> AppResult<Vec<UserToken>> {
        sqlx::query_as::<_, UserToken>(
            r#"
            SELECT user_id, email, access_token, refresh_token, scope, token_type,
                   expiry_date, created_at, updated_at
            FROM user_tokens
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to list user tokens: {e}")))
    }
}

/// DB行 (tuple) を ThreadSummary に変換
fn summary_from_row(
    row: (
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
    ),
) -> ThreadSummary {
    // DBの値が不正でも読み出しは失敗させず、デフォルトへフォールバック
    let urgency = Urgency::parse(&row.5).unwrap_or(Urgency::Low);
    let suggested_action = SuggestedAction::parse(&row.6).unwrap_or(SuggestedAction::ReadLater);

    ThreadSummary {
        id: row.0,
        thread_id: row.1,
        user_id: row.2,
        subject: row.3,
        summary: row.4,
        urgency,
        suggested_action,
        created_at: row.7,
        updated_at: row.8,
    }
}

const SUMMARY_COLUMNS: &str = "id, thread_id, user_id, subject, summary, urgency, \
                               suggested_action, created_at, updated_at";

/// SQLiteを使用したSummaryRepositoryの実装
pub struct SqliteSummaryRepository {
    pool: SqlitePool,
}

impl SqliteSummaryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryRepository for SqliteSummaryRepository {
    async fn upsert_summary(&self, summary: UpsertThreadSummary) -> AppResult<ThreadSummary> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO thread_summaries
                (id, thread_id, user_id, subject, summary, urgency, suggested_action,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (thread_id, user_id) DO UPDATE SET
                subject = excluded.subject,
                summary = excluded.summary,
                urgency = excluded.urgency,
                suggested_action = excluded.suggested_action,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(&summary.thread_id)
        .bind(&summary.user_id)
        .bind(&summary.subject)
        .bind(&summary.summary)
        .bind(summary.urgency.as_str())
        .bind(summary.suggested_action.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to save thread summary: {e}")))?;

        self.get_summary_by_thread(&summary.thread_id, &summary.user_id)
            .await?
            .ok_or_else(|| {
                AppError::Provider(
                    "Failed to save thread summary: row missing after upsert".to_string(),
                )
            })
    }

    async fn get_summaries_for_user(&self, user_id: &str) -> AppResult<Vec<ThreadSummary>> {
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        )> = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM thread_summaries \
             WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get thread summaries: {e}")))?;

        Ok(rows.into_iter().map(summary_from_row).collect())
    }

    async fn get_summary_by_id(&self, id: &str) -> AppResult<Option<ThreadSummary>> {
        let row: Option<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        )> = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM thread_summaries WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get thread summary: {e}")))?;

        Ok(row.map(summary_from_row))
    }

    async fn get_summary_by_thread(
        &self,
        thread_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ThreadSummary>> {
        let row: Option<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        )> = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM thread_summaries \
             WHERE thread_id = ? AND user_id = ?"
        ))
        .bind(thread_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get thread summary: {e}")))?;

        Ok(row.map(summary_from_row))
    }

    async fn update_suggested_action(
        &self,
        thread_id: &str,
        user_id: &str,
        action: SuggestedAction,
    ) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE thread_summaries
            SET suggested_action = ?, updated_at = ?
            WHERE thread_id = ? AND user_id = ?
            "#,
        )
        .bind(action.as_str())
        .bind(&now)
        .bind(thread_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to update suggested action: {e}")))?;

        if result.rows_affected() == 0 {
            log::debug!("No summary to update for thread {thread_id} (user {user_id})");
        }
        Ok(())
    }
}

/// SQLiteを使用したReplyRepositoryの実装
pub struct SqliteReplyRepository {
    pool: SqlitePool,
}

impl SqliteReplyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReplyRepository for SqliteReplyRepository {
    async fn append_reply(
        &self,
        thread_id: &str,
        user_id: &str,
        message: &str,
    ) -> AppResult<EmailReply> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO email_replies
                (id, thread_id, user_id, message, sent_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(thread_id)
        .bind(user_id)
        .bind(message)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to save email reply: {e}")))?;

        Ok(EmailReply {
            id,
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            sent_at: now.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn get_replies_for_thread(&self, thread_id: &str) -> AppResult<Vec<EmailReply>> {
        sqlx::query_as::<_, EmailReply>(
            r#"
            SELECT id, thread_id, user_id, message, sent_at, created_at, updated_at
            FROM email_replies
            WHERE thread_id = ?
            ORDER BY sent_at DESC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get thread replies: {e}")))
    }

    async fn get_replies_for_user(&self, user_id: &str) -> AppResult<Vec<EmailReply>> {
        sqlx::query_as::<_, EmailReply>(
            r#"
            SELECT id, thread_id, user_id, message, sent_at, created_at, updated_at
            FROM email_replies
            WHERE user_id = ?
            ORDER BY sent_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Provider(format!("Failed to get user replies: {e}")))
    }
}
