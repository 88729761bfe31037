//! OAuthトークンのライフサイクル管理
//!
//! ユーザーごとに保存されたトークンの読み出し・失効チェック・リフレッシュを
//! 行う。メールボックスAPIを呼ぶ全操作はここを経由して有効なトークンを得る。
//!
//! # セキュリティガイドライン
//! - access_token / refresh_token の値をログに出力しないこと
//! - ログに出力できるのはユーザーID・トークン長・失効日時のみ
//!
//! # Locking
//! リフレッシュはユーザー単位のクリティカルセクション。同一ユーザーへの
//! 並行呼び出しはユーザーごとのロックで直列化され、先行するリフレッシュの
//! 完了を待ってから保存済みトークンを読み直す。このため失効1回につき
//! リフレッシュ呼び出しは最大1回となる。

use crate::error::{AppError, AppResult};
use crate::mailbox_client::MailboxApi;
use crate::repository::{TokenRepository, UpsertUserToken, UserToken};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct TokenManager<M, R>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
{
    mailbox: Arc<M>,
    tokens: Arc<R>,
    /// ユーザーごとのリフレッシュロック
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<M, R> TokenManager<M, R>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
{
    pub fn new(mailbox: Arc<M>, tokens: Arc<R>) -> Self {
        Self {
            mailbox,
            tokens,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// ユーザー単位のロックを取得（無ければ作成）
    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// ユーザーの有効な認証情報を返す
    ///
    /// 保存済みトークンが未失効ならそのまま返す。失効していればリフレッシュ
    /// トークンで再取得し、**返す前に**保存する（保存後のクラッシュでも
    /// 新トークンを失わない）。リフレッシュトークンはプロバイダが新しい値を
    /// 発行しない限り既存の値を保持する。
    ///
    /// # Errors
    /// - 保存済みトークンが無い場合は `AppError::Auth`
    /// - リフレッシュ失敗（取り消し済みグラント・ネットワーク）は伝播し、
    ///   部分的な保存は行わない
    pub async fn ensure_valid(&self, user_id: &str) -> AppResult<UserToken> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }

        // 同一ユーザーの並行リフレッシュを防ぐ
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let token = self
            .tokens
            .get_token(user_id)
            .await?
            .ok_or_else(|| {
                AppError::Auth(format!("No stored credentials found for user {user_id}"))
            })?;

        let now_ms = Utc::now().timestamp_millis();
        if token.expiry_date > now_ms {
            return Ok(token);
        }

        log::info!("Access token expired for user {user_id}, refreshing");

        let response = self
            .mailbox
            .refresh_access_token(&token.refresh_token)
            .await?;

        let expiry_date = now_ms + response.expires_in * 1000;
        let refreshed = self
            .tokens
            .upsert_token(UpsertUserToken {
                user_id: token.user_id.clone(),
                email: token.email.clone(),
                access_token: response.access_token,
                // プロバイダがローテーションした場合のみ差し替える
                refresh_token: response.refresh_token.unwrap_or(token.refresh_token),
                scope: response.scope.unwrap_or(token.scope),
                token_type: response.token_type.unwrap_or(token.token_type),
                expiry_date,
            })
            .await?;

        log::info!(
            "Token refreshed for user {user_id} (new expiry: {})",
            refreshed.expiry_date
        );
        Ok(refreshed)
    }

    /// 認可コードをトークンへ交換し、アカウントを登録する
    ///
    /// プロフィールから取得したメールアドレスをユーザーIDとして使用する。
    /// offlineグラントでない（リフレッシュトークンが無い）場合は
    /// `AppError::Auth`
    pub async fn exchange_code(&self, code: &str) -> AppResult<UserToken> {
        if code.trim().is_empty() {
            return Err(AppError::Validation(
                "authorization code is required".to_string(),
            ));
        }

        let response = self.mailbox.exchange_code(code).await?;

        let refresh_token = response.refresh_token.ok_or_else(|| {
            AppError::Auth(
                "Token response contains no refresh token (offline access required)".to_string(),
            )
        })?;

        let profile = self.mailbox.get_profile(&response.access_token).await?;
        let expiry_date = Utc::now().timestamp_millis() + response.expires_in * 1000;

        let token = self
            .tokens
            .upsert_token(UpsertUserToken {
                user_id: profile.email_address.clone(),
                email: profile.email_address,
                access_token: response.access_token,
                refresh_token,
                scope: response.scope.unwrap_or_default(),
                token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
                expiry_date,
            })
            .await?;

        log::info!("Stored credentials for user {}", token.user_id);
        Ok(token)
    }
}
