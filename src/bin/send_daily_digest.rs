//! デイリーダイジェスト送信のエントリーポイント
//!
//! 外部スケジューラ（cron等）から1回の実行として起動される。フラグは
//! 持たない。ユーザー単位の失敗を握りつぶした上で実行が完了すれば
//! 終了コード0、ユーザー列挙（または起動処理）が失敗すれば1を返す。

use maa_lib::config::AppConfig;
use maa_lib::digest::{DigestOrchestrator, DigestRunReport, HttpDigestSender};
use maa_lib::error::AppResult;
use maa_lib::create_pool;
use maa_lib::repository::{self, SqliteSummaryRepository, SqliteTokenRepository};
use std::io::Write;
use std::sync::Arc;

fn init_logger() {
    // リリースビルドではWarnレベル以上、デバッグビルドではInfoレベル以上のログを出力
    #[cfg(debug_assertions)]
    let default_level = log::LevelFilter::Info;
    #[cfg(not(debug_assertions))]
    let default_level = log::LevelFilter::Warn;

    env_logger::Builder::from_default_env()
        .filter_level(default_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

async fn run() -> AppResult<DigestRunReport> {
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    repository::init_schema(&pool).await?;

    let tokens = Arc::new(SqliteTokenRepository::new(pool.clone()));
    let summaries = Arc::new(SqliteSummaryRepository::new(pool.clone()));
    let sender = Arc::new(HttpDigestSender::new(config.digest.clone())?);

    let orchestrator = DigestOrchestrator::new(tokens, summaries, sender);
    orchestrator.run_daily_digests().await
}

#[tokio::main]
async fn main() {
    init_logger();

    match run().await {
        Ok(report) => {
            log::info!(
                "Daily digests sent: {} delivered, {} skipped, {} failed ({} user(s))",
                report.delivered,
                report.skipped,
                report.failed,
                report.attempted
            );
            std::process::exit(0);
        }
        Err(e) => {
            log::error!("Daily digest run failed: {e}");
            std::process::exit(1);
        }
    }
}
