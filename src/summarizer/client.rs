//! サマライザーAPIクライアント
//!
//! OpenAI互換のチャット補完APIでスレッドを要約する。
//!
//! # セキュリティガイドライン
//! - APIキーはログに出力しない
//! - プロンプト（メール本文を含む）をログに出力しない。ログは文字数・
//!   件数・処理時間などの統計情報のみ

use crate::config::SummarizerConfig;
use crate::error::{AppError, AppResult};
use crate::mailbox::EmailThread;
use crate::repository::UpsertThreadSummary;
use crate::summarizer::parse::{parse_summary_response, SummaryDefaults};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::time::Duration;

/// リクエスト送信〜レスポンスボディ取得のタイムアウト（秒）
/// ネットワークハング時に要約バッチが永久に実行中のままになるのを防ぐ
const SUMMARIZER_REQUEST_TIMEOUT_SECS: u64 = 120;

const SYSTEM_PROMPT: &str = "You are an AI assistant that analyzes email threads and provides \
                             concise summaries, urgency levels, and suggested actions.";

/// チャット補完レスポンスの構造
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// スレッド要約を抽象化するトレイト（テスト用モック対応）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// スレッドを要約し、upsert可能なサマリーを返す
    async fn summarize_thread(
        &self,
        thread: &EmailThread,
        user_id: &str,
    ) -> AppResult<UpsertThreadSummary>;
}

/// サマライザーAPIクライアント実装
/// リクエストボディに Full<Bytes> を使用（hyper-util Client の型パラメータと一致）
pub struct HttpSummarizer {
    config: SummarizerConfig,
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    defaults: SummaryDefaults,
}

impl HttpSummarizer {
    /// 新しいサマライザークライアントを作成
    ///
    /// # セキュリティ
    /// APIキーはログに出力されません
    pub fn new(config: SummarizerConfig) -> AppResult<Self> {
        Self::with_defaults(config, SummaryDefaults::default())
    }

    /// フォールバック値を指定してクライアントを作成
    pub fn with_defaults(config: SummarizerConfig, defaults: SummaryDefaults) -> AppResult<Self> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Provider(format!("Failed to create HTTPS connector: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        log::info!("Summarizer client created with model: {}", config.model);

        Ok(Self {
            config,
            http_client,
            defaults,
        })
    }

    /// スレッドの会話内容をプロンプト用に整形する
    fn build_thread_transcript(thread: &EmailThread) -> String {
        thread
            .messages
            .iter()
            .map(|msg| {
                format!(
                    "\nFrom: {}\nTo: {}\nDate: {}\nSubject: {}\n{}\n{}\n---",
                    msg.from,
                    msg.to,
                    msg.date.to_rfc3339(),
                    msg.subject,
                    if msg.is_reply {
                        "(Reply)"
                    } else {
                        "(Original Message)"
                    },
                    msg.body
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// プロンプト構築
    fn build_prompt(thread: &EmailThread) -> String {
        format!(
            "Please analyze this email thread and provide:\n\
             1. A concise two-sentence summary of the conversation\n\
             2. Urgency level (Low, Medium, or High)\n\
             3. Suggested action (Reply, Follow Up, Read Later, Archive, or Forward)\n\
             \n\
             Consider:\n\
             - The tone and content of the messages\n\
             - Time sensitivity\n\
             - Whether it requires immediate attention\n\
             - If it's a one-time conversation or ongoing discussion\n\
             \n\
             Email thread:\n{}",
            Self::build_thread_transcript(thread)
        )
    }

    /// APIリクエストボディを構築
    fn build_request_body(&self, prompt: &str) -> String {
        serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.7
        })
        .to_string()
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize_thread(
        &self,
        thread: &EmailThread,
        user_id: &str,
    ) -> AppResult<UpsertThreadSummary> {
        let prompt = Self::build_prompt(thread);
        let request_body = self.build_request_body(&prompt);

        // リクエストのメトリクスのみログに出力（本文は含めない）
        log::debug!(
            "Summarizing thread {} ({} message(s), request body length: {} bytes)",
            thread.id,
            thread.messages.len(),
            request_body.len()
        );

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.config.endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .body(Full::new(Bytes::from(request_body)))
            .map_err(|e| AppError::Provider(format!("Failed to build request: {e}")))?;

        let result = tokio::time::timeout(
            Duration::from_secs(SUMMARIZER_REQUEST_TIMEOUT_SECS),
            async {
                let response = self
                    .http_client
                    .request(req)
                    .await
                    .map_err(|e| format!("request failed: {e}"))?;
                let status = response.status();
                let body_bytes = response
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| format!("failed to read response body: {e}"))?
                    .to_bytes();
                Ok::<_, String>((status, body_bytes))
            },
        )
        .await;

        let (status, body_bytes) = match result {
            Ok(Ok((s, b))) => (s, b),
            Ok(Err(e)) => {
                return Err(AppError::Provider(format!(
                    "Failed to summarize thread: {e}"
                )))
            }
            Err(_) => {
                return Err(AppError::Provider(format!(
                    "Failed to summarize thread: timed out after {SUMMARIZER_REQUEST_TIMEOUT_SECS} seconds"
                )))
            }
        };

        if !status.is_success() {
            // レスポンスボディ全文はログに出さず、メタ情報のみ出力
            log::error!(
                "Summarizer API error (status {status}), response body length: {} bytes",
                body_bytes.len()
            );
            return Err(AppError::Provider(format!(
                "Failed to summarize thread: status {status}"
            )));
        }

        let chat_response: ChatResponse = serde_json::from_slice(&body_bytes)
            .map_err(|e| AppError::Provider(format!("Failed to parse summarizer response: {e}")))?;

        if let Some(error) = chat_response.error {
            log::error!(
                "Summarizer API returned error object (message length: {} chars)",
                error.message.len()
            );
            return Err(AppError::Provider(
                "Failed to summarize thread: API returned an error".to_string(),
            ));
        }

        let content = chat_response
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| {
                AppError::Provider("No content in summarizer response".to_string())
            })?;

        let parsed = parse_summary_response(&content, &self.defaults);

        log::info!(
            "Summarized thread {} for user {user_id} (urgency: {})",
            thread.id,
            parsed.urgency.as_str()
        );

        Ok(UpsertThreadSummary {
            thread_id: thread.id.clone(),
            user_id: user_id.to_string(),
            subject: thread.subject.clone(),
            summary: parsed.summary,
            urgency: parsed.urgency,
            suggested_action: parsed.suggested_action,
        })
    }
}
