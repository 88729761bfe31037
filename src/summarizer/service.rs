//! スレッド要約の一括実行
//!
//! 取得済みスレッドを1件ずつ要約してDBへupsertする。要約はプロバイダの
//! レート制限を考慮して**順次**実行し（ファンアウトしない）、1件の失敗は
//! 記録した上で残りの処理を続行する。

use crate::error::AppResult;
use crate::mailbox::{EmailThread, ThreadFetcher};
use crate::mailbox_client::MailboxApi;
use crate::repository::{SummaryRepository, ThreadSummary, TokenRepository};
use crate::summarizer::client::Summarizer;
use std::sync::Arc;

/// 一括要約の結果（成功分のサマリーと件数の内訳）
#[derive(Debug, Clone)]
pub struct SummarizeRunResult {
    pub summaries: Vec<ThreadSummary>,
    pub success_count: usize,
    pub failed_count: usize,
}

/// 要約の一括実行サービス
///
/// 型パラメータ:
/// - `S`: サマライザー
/// - `P`: サマリーリポジトリ
pub struct SummaryService<S, P>
where
    S: Summarizer + 'static,
    P: SummaryRepository + 'static,
{
    summarizer: Arc<S>,
    summaries: Arc<P>,
}

impl<S, P> SummaryService<S, P>
where
    S: Summarizer + 'static,
    P: SummaryRepository + 'static,
{
    pub fn new(summarizer: Arc<S>, summaries: Arc<P>) -> Self {
        Self {
            summarizer,
            summaries,
        }
    }

    /// スレッド群を順次要約し、サマリーをupsertする
    ///
    /// 1件の要約・保存失敗は警告ログを残してスキップし、残りの処理を
    /// 続行する。結果には成功分のサマリーと成功・失敗件数が含まれる。
    pub async fn summarize_threads(
        &self,
        user_id: &str,
        threads: &[EmailThread],
    ) -> SummarizeRunResult {
        let mut summaries: Vec<ThreadSummary> = Vec::with_capacity(threads.len());
        let mut failed_count = 0usize;

        for thread in threads {
            let result = async {
                let summary = self.summarizer.summarize_thread(thread, user_id).await?;
                self.summaries.upsert_summary(summary).await
            }
            .await;

            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    log::warn!("Failed to summarize thread {}: {e}", thread.id);
                    failed_count += 1;
                }
            }
        }

        log::info!(
            "Summarize run for user {user_id}: {} succeeded, {} failed",
            summaries.len(),
            failed_count
        );

        SummarizeRunResult {
            success_count: summaries.len(),
            failed_count,
            summaries,
        }
    }
}

/// 直近のスレッドを取得してまとめて要約する
///
/// 取得（`list_threads`）の失敗は呼び出し全体の失敗として伝播する。
/// 要約・保存の失敗は件数として結果に現れる。
pub async fn summarize_recent_threads<M, R, S, P>(
    fetcher: &ThreadFetcher<M, R>,
    service: &SummaryService<S, P>,
    user_id: &str,
    limit: u32,
) -> AppResult<SummarizeRunResult>
where
    M: MailboxApi + 'static,
    R: TokenRepository + 'static,
    S: Summarizer + 'static,
    P: SummaryRepository + 'static,
{
    let threads = fetcher.list_threads(user_id, limit).await?;
    Ok(service.summarize_threads(user_id, &threads).await)
}
