//! ダイジェストメールの組み立てと配信
//!
//! 緊急度ごとにグループ化されたサマリーをHTMLに整形し、トランザクショナル
//! メールAPIで配信する。
//!
//! # セキュリティガイドライン
//! - APIキーはログに出力しない
//! - メール件名・要約本文をログに出力しない。ログは宛先ユーザーID・
//!   件数などの統計情報のみ

use crate::config::DigestConfig;
use crate::error::{AppError, AppResult};
use crate::logic::digest_logic::DigestGroup;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::time::Duration;

/// リクエスト送信〜レスポンスボディ取得のタイムアウト（秒）
const DIGEST_REQUEST_TIMEOUT_SECS: u64 = 30;

const DIGEST_SUBJECT: &str = "Your Daily Email Digest";

/// ダイジェスト配信を抽象化するトレイト（テスト用モック対応）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DigestSender: Send + Sync {
    /// グループ化済みサマリーをダイジェストとして配信する
    async fn send_digest(&self, to_email: &str, groups: &[DigestGroup]) -> AppResult<()>;
}

/// サマリー由来のテキストをHTMLへ埋め込む前にエスケープする
fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// ダイジェストメールのHTML本文を組み立てる
pub fn render_digest_html(groups: &[DigestGroup]) -> String {
    let mut html = String::new();
    html.push_str("<h1>Your Daily Email Digest</h1>\n");
    html.push_str("<p>Here are your most urgent emails that need attention:</p>\n");

    for group in groups {
        html.push_str(&format!("<h2>{} Priority</h2>\n", group.urgency.as_str()));
        for summary in &group.summaries {
            html.push_str(&format!(
                "<div style=\"margin-bottom: 20px; padding: 15px; border: 1px solid #eee; border-radius: 5px;\">\n\
                 <h3 style=\"margin: 0 0 10px 0;\">{}</h3>\n\
                 <p style=\"margin: 0 0 10px 0;\">{}</p>\n\
                 <div style=\"color: #666;\"><strong>Suggested Action:</strong> {}</div>\n\
                 </div>\n",
                html_escape(&summary.subject),
                html_escape(&summary.summary),
                summary.suggested_action.as_str()
            ));
        }
    }

    html.push_str(
        "<p style=\"margin-top: 20px; color: #666;\">\
         This is an automated digest from your AI Email Assistant.</p>\n",
    );
    html
}

/// 配信APIへのリクエストボディ
#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// トランザクショナルメールAPIによるDigestSender実装
/// リクエストボディに Full<Bytes> を使用（hyper-util Client の型パラメータと一致）
pub struct HttpDigestSender {
    config: DigestConfig,
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpDigestSender {
    /// 新しい配信クライアントを作成
    ///
    /// # セキュリティ
    /// APIキーはログに出力されません
    pub fn new(config: DigestConfig) -> AppResult<Self> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Provider(format!("Failed to create HTTPS connector: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl DigestSender for HttpDigestSender {
    async fn send_digest(&self, to_email: &str, groups: &[DigestGroup]) -> AppResult<()> {
        let html = render_digest_html(groups);
        let item_count: usize = groups.iter().map(|g| g.summaries.len()).sum();

        let body = serde_json::to_string(&SendEmailRequest {
            from: &self.config.from_address,
            to: to_email,
            subject: DIGEST_SUBJECT,
            html: &html,
        })
        .map_err(|e| AppError::Provider(format!("Failed to build digest request: {e}")))?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.config.endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AppError::Provider(format!("Failed to build request: {e}")))?;

        let result = tokio::time::timeout(
            Duration::from_secs(DIGEST_REQUEST_TIMEOUT_SECS),
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
                return Err(AppError::Provider(format!("Failed to send digest: {e}")))
            }
            Err(_) => {
                return Err(AppError::Provider(format!(
                    "Failed to send digest: timed out after {DIGEST_REQUEST_TIMEOUT_SECS} seconds"
                )))
            }
        };

        if !status.is_success() {
            log::error!(
                "Digest delivery API error (status {status}), response body length: {} bytes",
                body_bytes.len()
            );
            return Err(AppError::Provider(format!(
                "Failed to send digest: status {status}"
            )));
        }

        log::info!("Digest sent ({item_count} item(s) in {} group(s))", groups.len());
        Ok(())
    }
}
