//! デイリーダイジェストのオーケストレーション
//!
//! トークンを保持する全ユーザーを列挙し、ユーザーごとに未返信サマリーの
//! ダイジェストを配信する。ユーザーの列挙失敗は実行全体の失敗。ユーザー
//! 単位の失敗は記録して隔離し、残りのユーザーの処理を続行する。

use crate::digest::delivery::DigestSender;
use crate::error::{AppError, AppResult};
use crate::logic::digest_logic;
use crate::repository::{SummaryRepository, TokenRepository, UserToken};
use std::sync::{Arc, Mutex};

/// Run state for digest orchestration
///
/// 実行中フラグとキャンセルフラグをメモリのみで管理する。
/// last_error はエラー時に設定され、次回 try_start でクリアされる。
///
/// # Lock Ordering
/// To prevent deadlock, always acquire locks in this order:
/// 1. `should_cancel`
/// 2. `is_running`
#[derive(Clone, Default)]
pub struct DigestRunState {
    should_cancel: Arc<Mutex<bool>>,
    is_running: Arc<Mutex<bool>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl DigestRunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 実行中のループへキャンセルを要求する（次のユーザー境界で停止）
    pub fn request_cancel(&self) {
        if let Ok(mut cancel) = self.should_cancel.lock() {
            *cancel = true;
        }
    }

    pub fn should_stop(&self) -> bool {
        self.should_cancel.lock().map(|c| *c).unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.lock().map(|r| *r).unwrap_or(false)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    pub fn set_error(&self, msg: &str) {
        if let Ok(mut err) = self.last_error.lock() {
            *err = Some(msg.to_string());
        }
    }

    pub fn clear_error(&self) {
        if let Ok(mut err) = self.last_error.lock() {
            *err = None;
        }
    }

    /// Atomically check if not running, reset the cancel flag, and mark running.
    /// Returns true if successfully started, false if already running.
    pub fn try_start(&self) -> bool {
        let mut cancel = match self.should_cancel.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Failed to acquire should_cancel lock in try_start");
                return false;
            }
        };
        let mut is_running = match self.is_running.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Failed to acquire is_running lock in try_start");
                return false;
            }
        };

        if *is_running {
            return false;
        }

        *is_running = true;
        *cancel = false;
        drop(is_running);
        drop(cancel);
        self.clear_error();

        true
    }
}

/// RAII guard that clears the running flag when dropped
/// This ensures cleanup happens even on early returns or panics
pub struct RunGuard<'a> {
    state: &'a DigestRunState,
}

impl<'a> RunGuard<'a> {
    pub const fn new(state: &'a DigestRunState) -> Self {
        Self { state }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        match self.state.is_running.lock() {
            Ok(mut is_running) => {
                *is_running = false;
            }
            Err(poisoned) => {
                log::warn!("Running flag mutex was poisoned in RunGuard::drop; clearing anyway");
                let mut is_running = poisoned.into_inner();
                *is_running = false;
            }
        }
    }
}

/// ユーザー1人分の処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDigestStatus {
    /// ダイジェストを配信した
    Delivered,
    /// 未返信サマリーが無く配信をスキップした
    Skipped,
    /// 処理に失敗した（実行全体は継続）
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UserDigestOutcome {
    pub user_id: String,
    pub status: UserDigestStatus,
}

/// 実行全体の結果（ユーザーごとの成否を明示的に保持する）
#[derive(Debug, Clone, Default)]
pub struct DigestRunReport {
    pub attempted: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<UserDigestOutcome>,
}

/// ダイジェストオーケストレーター
///
/// 型パラメータ:
/// - `R`: トークンリポジトリ
/// - `S`: サマリーリポジトリ
/// - `D`: ダイジェスト配信クライアント
pub struct DigestOrchestrator<R, S, D>
where
    R: TokenRepository + 'static,
    S: SummaryRepository + 'static,
    D: DigestSender + 'static,
{
    tokens: Arc<R>,
    summaries: Arc<S>,
    sender: Arc<D>,
    state: DigestRunState,
}

impl<R, S, D> DigestOrchestrator<R, S, D>
where
    R: TokenRepository + 'static,
    S: SummaryRepository + 'static,
    D: DigestSender + 'static,
{
    pub fn new(tokens: Arc<R>, summaries: Arc<S>, sender: Arc<D>) -> Self {
        Self {
            tokens,
            summaries,
            sender,
            state: DigestRunState::new(),
        }
    }

    /// 実行状態（キャンセル要求・実行中チェック用）
    pub fn run_state(&self) -> &DigestRunState {
        &self.state
    }

    /// ユーザー1人分のダイジェスト処理
    async fn process_user(&self, user: &UserToken) -> AppResult<UserDigestStatus> {
        let summaries = self.summaries.get_summaries_for_user(&user.user_id).await?;

        let groups = match digest_logic::prepare_digest(summaries) {
            Some(groups) => groups,
            None => {
                log::debug!("No unreplied summaries for user {}, skipping", user.user_id);
                return Ok(UserDigestStatus::Skipped);
            }
        };

        self.sender.send_digest(&user.email, &groups).await?;
        Ok(UserDigestStatus::Delivered)
    }

    /// デイリーダイジェストを1回実行する
    ///
    /// トークンを保持する全ユーザーを列挙し、**順次**処理する（障害の隔離と、
    /// レート制限のあるプロバイダへの無制限な並行呼び出しの回避のため）。
    /// ユーザー単位の失敗は捕捉・記録して次のユーザーへ進む。1回の実行で
    /// ユーザーごとの配信試行は最大1回。
    ///
    /// # Errors
    /// - 既に実行中の場合は `AppError::Validation`
    /// - ユーザー列挙の失敗は `AppError::Provider`（実行全体が失敗）
    pub async fn run_daily_digests(&self) -> AppResult<DigestRunReport> {
        if !self.state.try_start() {
            return Err(AppError::Validation(
                "digest run already in progress".to_string(),
            ));
        }
        let _guard = RunGuard::new(&self.state);

        let users = match self.tokens.list_tokens().await {
            Ok(users) => users,
            Err(e) => {
                // 列挙の失敗は実行全体の失敗（フェイルファスト）
                self.state.set_error(&e.to_string());
                return Err(e);
            }
        };

        log::info!("Starting daily digest run for {} user(s)", users.len());

        let mut report = DigestRunReport::default();

        for user in &users {
            if self.state.should_stop() {
                log::info!("Digest run cancelled after {} user(s)", report.attempted);
                break;
            }

            report.attempted += 1;

            let status = match self.process_user(user).await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Failed to process digest for user {}: {e}", user.user_id);
                    UserDigestStatus::Failed(e.to_string())
                }
            };

            match &status {
                UserDigestStatus::Delivered => report.delivered += 1,
                UserDigestStatus::Skipped => report.skipped += 1,
                UserDigestStatus::Failed(_) => report.failed += 1,
            }
            report.outcomes.push(UserDigestOutcome {
                user_id: user.user_id.clone(),
                status,
            });
        }

        log::info!(
            "Daily digest run complete: {} delivered, {} skipped, {} failed",
            report.delivered,
            report.skipped,
            report.failed
        );

        Ok(report)
    }
}
