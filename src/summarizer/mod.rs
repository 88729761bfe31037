//! スレッド要約（AI連携）モジュール

pub mod client;
pub mod parse;
pub mod service;

pub use client::{HttpSummarizer, Summarizer};
pub use parse::{ParsedSummary, SummaryDefaults};
pub use service::{summarize_recent_threads, SummarizeRunResult, SummaryService};
