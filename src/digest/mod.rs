//! デイリーダイジェスト配信モジュール

pub mod delivery;
pub mod scheduler;

pub use delivery::{render_digest_html, DigestSender, HttpDigestSender};
pub use scheduler::{
    DigestOrchestrator, DigestRunReport, DigestRunState, RunGuard, UserDigestOutcome,
    UserDigestStatus,
};
