//! メールボックスプロバイダのREST APIクライアント
//!
//! # セキュリティガイドライン
//! このモジュールはユーザーのメールデータを扱うため、以下のセキュリティ
//! ルールを厳守してください：
//!
//! - **機密情報のログ出力禁止**: メール本文、件名、アドレス、アクセス
//!   トークンをログに出力しないこと
//! - **メトリクスのみ**: ログに出力できるのは件数、ステータスコード、
//!   処理時間などの統計情報のみ

use crate::config::OAuthConfig;
use crate::error::{AppError, AppResult};
use crate::mailbox_client::MailboxApi;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// リクエスト送信〜レスポンスボディ取得のタイムアウト（秒）
/// ネットワークハング時に呼び出し元の処理が永久に待ち続けるのを防ぐ
const MAILBOX_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// 要求するOAuthスコープ（読み取り + 送信 + アカウントメール）
const OAUTH_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// メッセージヘッダー（名前と値のペア）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePartHeader {
    pub name: String,
    pub value: String,
}

/// MIMEパートの本文。リーフパートのみ `data` を持つ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePartBody {
    /// base64url（パディングなし）エンコードされた本文
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// MIMEパートツリーのノード
///
/// `body.data` を持つリーフ、または `parts` に子を持つコンテナ。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<MessagePartHeader>>,
    #[serde(default)]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

/// プロバイダが返す生メッセージ
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// プロバイダが返す生スレッド（メッセージはプロバイダの並び順のまま）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawThread {
    pub id: String,
    #[serde(default)]
    pub messages: Option<Vec<RawMessage>>,
}

/// スレッド一覧レスポンス
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListThreadsResponse {
    #[serde(default)]
    threads: Option<Vec<ThreadRef>>,
}

#[derive(Debug, Deserialize)]
struct ThreadRef {
    id: String,
}

/// OAuthトークンエンドポイントのレスポンス
///
/// `refresh_token` はプロバイダがローテーションした場合のみ含まれる。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// アクセストークンの有効期間（秒）
    pub expires_in: i64,
}

/// アカウントプロフィール
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxProfile {
    pub email_address: String,
}

/// raw送信リクエストのボディ
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRawRequest<'a> {
    raw: &'a str,
    thread_id: &'a str,
}

/// 接続先エンドポイント。テスト時にモックサーバーへ差し替える
#[derive(Debug, Clone)]
pub struct MailboxEndpoints {
    pub api_base: String,
    pub token_endpoint: String,
}

impl Default for MailboxEndpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// 認可コード取得用の同意画面URLを構築する
///
/// offlineアクセス（リフレッシュトークン発行）と同意画面の再表示を
/// 必ず要求する。
pub fn build_auth_url(oauth: &OAuthConfig) -> AppResult<String> {
    let url = url::Url::parse_with_params(
        DEFAULT_AUTH_ENDPOINT,
        &[
            ("client_id", oauth.client_id.as_str()),
            ("redirect_uri", oauth.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", OAUTH_SCOPES.join(" ").as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| AppError::Provider(format!("Failed to build auth URL: {e}")))?;

    Ok(url.into())
}

/// メールボックスAPIクライアント実装
/// リクエストボディに Full<Bytes> を使用（hyper-util Client の型パラメータと一致）
pub struct HttpMailboxClient {
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    oauth: OAuthConfig,
    endpoints: MailboxEndpoints,
}

impl HttpMailboxClient {
    /// 新しいクライアントを作成（本番エンドポイント）
    pub fn new(oauth: OAuthConfig) -> AppResult<Self> {
        Self::with_endpoints(oauth, MailboxEndpoints::default())
    }

    /// エンドポイントを指定してクライアントを作成（テスト用）
    pub fn with_endpoints(oauth: OAuthConfig, endpoints: MailboxEndpoints) -> AppResult<Self> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Provider(format!("Failed to create HTTPS connector: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        Ok(Self {
            http_client,
            oauth,
            endpoints,
        })
    }

    /// リクエストを実行し、タイムアウト付きでレスポンスボディまで読み切る
    async fn execute(
        &self,
        req: Request<Full<Bytes>>,
        operation: &str,
    ) -> AppResult<(StatusCode, Bytes)> {
        let result = tokio::time::timeout(
            Duration::from_secs(MAILBOX_REQUEST_TIMEOUT_SECS),
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

        match result {
            Ok(Ok((status, bytes))) => Ok((status, bytes)),
            Ok(Err(e)) => Err(AppError::Provider(format!("Failed to {operation}: {e}"))),
            Err(_) => Err(AppError::Provider(format!(
                "Failed to {operation}: timed out after {MAILBOX_REQUEST_TIMEOUT_SECS} seconds"
            ))),
        }
    }

    /// ステータスコードをエラー分類へ対応付ける
    ///
    /// レスポンスボディ全文はログに出さず、ステータスとボディ長のみ出力する
    /// （エラーメッセージが件名等を含むケースがあるため）。
    fn check_status(status: StatusCode, body: &Bytes, operation: &str) -> AppResult<()> {
        if status.is_success() {
            return Ok(());
        }

        log::error!(
            "Mailbox API error on {operation} (status {status}), response body length: {} bytes",
            body.len()
        );

        let message = format!("Failed to {operation}: status {status}");
        match status.as_u16() {
            401 | 403 => Err(AppError::Auth(message)),
            404 => Err(AppError::NotFound(message)),
            _ => Err(AppError::Provider(message)),
        }
    }

    /// BearerトークンでのGETリクエストを構築
    fn get_request(&self, uri: &str, access_token: &str) -> AppResult<Request<Full<Bytes>>> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .body(Full::new(Bytes::new()))
            .map_err(|e| AppError::Provider(format!("Failed to build request: {e}")))
    }

    /// トークンエンドポイントへフォームPOSTし、レスポンスをパースする
    async fn request_token(
        &self,
        form: &[(&str, &str)],
        operation: &str,
    ) -> AppResult<TokenResponse> {
        let body = form
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let req = Request::builder()
            .method(Method::POST)
            .uri(self.endpoints.token_endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AppError::Provider(format!("Failed to build request: {e}")))?;

        let (status, bytes) = self.execute(req, operation).await?;

        if !status.is_success() {
            log::error!(
                "Token endpoint error on {operation} (status {status}), response body length: {} bytes",
                bytes.len()
            );
            // トークンエンドポイントの失敗（取り消し済みグラント等）は認証エラー
            return Err(AppError::Auth(format!(
                "Failed to {operation}: status {status}"
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Provider(format!("Failed to parse token response: {e}")))
    }
}

#[async_trait]
impl MailboxApi for HttpMailboxClient {
    async fn list_thread_ids(
        &self,
        access_token: &str,
        limit: u32,
        query: &str,
    ) -> AppResult<Vec<String>> {
        let uri = url::Url::parse_with_params(
            &format!("{}/users/me/threads", self.endpoints.api_base),
            &[("maxResults", limit.to_string().as_str()), ("q", query)],
        )
        .map_err(|e| AppError::Provider(format!("Failed to build threads URL: {e}")))?;

        let req = self.get_request(uri.as_str(), access_token)?;
        let (status, bytes) = self.execute(req, "list threads").await?;
        Self::check_status(status, &bytes, "list threads")?;

        let response: ListThreadsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Provider(format!("Failed to parse thread list: {e}")))?;

        let ids: Vec<String> = response
            .threads
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.id)
            .collect();

        log::debug!("Listed {} thread id(s)", ids.len());
        Ok(ids)
    }

    async fn get_thread(&self, access_token: &str, thread_id: &str) -> AppResult<RawThread> {
        let uri = format!(
            "{}/users/me/threads/{}?format=full",
            self.endpoints.api_base, thread_id
        );

        let req = self.get_request(&uri, access_token)?;
        let (status, bytes) = self.execute(req, "get thread").await?;
        Self::check_status(status, &bytes, "get thread")?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Provider(format!("Failed to parse thread {thread_id}: {e}")))
    }

    async fn send_raw(&self, access_token: &str, raw: &str, thread_id: &str) -> AppResult<()> {
        let uri = format!("{}/users/me/messages/send", self.endpoints.api_base);
        let body = serde_json::to_string(&SendRawRequest { raw, thread_id })
            .map_err(|e| AppError::Provider(format!("Failed to build send request: {e}")))?;

        let req = Request::builder()
            .method(Method::POST)
            .uri(uri.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AppError::Provider(format!("Failed to build request: {e}")))?;

        let (status, bytes) = self.execute(req, "send reply").await?;
        Self::check_status(status, &bytes, "send reply")?;

        log::info!("Reply sent to thread {thread_id}");
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        self.request_token(
            &[
                ("code", code),
                ("client_id", &self.oauth.client_id),
                ("client_secret", &self.oauth.client_secret),
                ("redirect_uri", &self.oauth.redirect_uri),
                ("grant_type", "authorization_code"),
            ],
            "exchange authorization code",
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        self.request_token(
            &[
                ("refresh_token", refresh_token),
                ("client_id", &self.oauth.client_id),
                ("client_secret", &self.oauth.client_secret),
                ("grant_type", "refresh_token"),
            ],
            "refresh access token",
        )
        .await
    }

    async fn get_profile(&self, access_token: &str) -> AppResult<MailboxProfile> {
        let uri = format!("{}/users/me/profile", self.endpoints.api_base);

        let req = self.get_request(&uri, access_token)?;
        let (status, bytes) = self.execute(req, "get profile").await?;
        Self::check_status(status, &bytes, "get profile")?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Provider(format!("Failed to parse profile: {e}")))
    }
}
