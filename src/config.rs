//! アプリケーション設定の管理
//!
//! デプロイ環境の環境変数から設定を読み込む。DB接続文字列、OAuthクライアント
//! 認証情報、サマライザーAPI、ダイジェスト配信APIをここで一元管理する。
//!
//! # セキュリティガイドライン
//! - client_secret / APIキーは絶対にログに出力しないこと
//! - 設定値のログ出力は非機密項目（モデル名、送信元アドレス等）のみ

use crate::error::{AppError, AppResult};

/// OAuthクライアント設定
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// サマライザー（AI）API設定
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub api_key: String,
    /// チャット補完エンドポイント。未設定時はOpenAI互換のデフォルト
    pub endpoint: String,
    pub model: String,
}

/// ダイジェスト配信（トランザクショナルメール）API設定
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub api_key: String,
    pub endpoint: String,
    /// 配信元アドレス（"AI Email Assistant <digest@example.com>" 形式）
    pub from_address: String,
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub oauth: OAuthConfig,
    pub summarizer: SummarizerConfig,
    pub digest: DigestConfig,
}

const DEFAULT_SUMMARIZER_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_SUMMARIZER_MODEL: &str = "gpt-4";
const DEFAULT_DIGEST_ENDPOINT: &str = "https://api.resend.com/emails";

/// 必須環境変数を読み込む。未設定・空文字はValidationエラー
fn require_env(name: &str) -> AppResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!(
            "Missing required environment variable: {name}"
        ))),
    }
}

/// 任意環境変数を読み込む。未設定・空文字はデフォルト値
fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # Returns
    /// 読み込んだ設定。必須変数が欠けている場合は `AppError::Validation`
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            database_url: env_or("DATABASE_URL", "sqlite:maa_data.db"),
            oauth: OAuthConfig {
                client_id: require_env("MAIL_CLIENT_ID")?,
                client_secret: require_env("MAIL_CLIENT_SECRET")?,
                redirect_uri: require_env("MAIL_REDIRECT_URI")?,
            },
            summarizer: SummarizerConfig {
                api_key: require_env("SUMMARIZER_API_KEY")?,
                endpoint: env_or("SUMMARIZER_ENDPOINT", DEFAULT_SUMMARIZER_ENDPOINT),
                model: env_or("SUMMARIZER_MODEL", DEFAULT_SUMMARIZER_MODEL),
            },
            digest: DigestConfig {
                api_key: require_env("DIGEST_API_KEY")?,
                endpoint: env_or("DIGEST_ENDPOINT", DEFAULT_DIGEST_ENDPOINT),
                from_address: require_env("DIGEST_FROM_ADDRESS")?,
            },
        };

        // 機密情報を含めずに読み込み結果のみログ
        log::info!(
            "Config loaded (summarizer model: {}, digest from: {})",
            config.summarizer.model,
            config.digest.from_address
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "DATABASE_URL",
            "MAIL_CLIENT_ID",
            "MAIL_CLIENT_SECRET",
            "MAIL_REDIRECT_URI",
            "SUMMARIZER_API_KEY",
            "SUMMARIZER_ENDPOINT",
            "SUMMARIZER_MODEL",
            "DIGEST_API_KEY",
            "DIGEST_ENDPOINT",
            "DIGEST_FROM_ADDRESS",
        ] {
            std::env::remove_var(var);
        }
    }

    fn set_required_env() {
        std::env::set_var("MAIL_CLIENT_ID", "client-id");
        std::env::set_var("MAIL_CLIENT_SECRET", "client-secret");
        std::env::set_var("MAIL_REDIRECT_URI", "http://localhost:3000/callback");
        std::env::set_var("SUMMARIZER_API_KEY", "sk-test");
        std::env::set_var("DIGEST_API_KEY", "re-test");
        std::env::set_var("DIGEST_FROM_ADDRESS", "Digest <digest@example.com>");
    }

    #[test]
    #[serial]
    fn test_from_env_with_defaults() {
        clear_env();
        set_required_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite:maa_data.db");
        assert_eq!(config.oauth.client_id, "client-id");
        assert_eq!(config.summarizer.endpoint, DEFAULT_SUMMARIZER_ENDPOINT);
        assert_eq!(config.summarizer.model, "gpt-4");
        assert_eq!(config.digest.endpoint, DEFAULT_DIGEST_ENDPOINT);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_required_var() {
        clear_env();
        set_required_env();
        std::env::remove_var("MAIL_CLIENT_SECRET");

        let result = AppConfig::from_env();
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("MAIL_CLIENT_SECRET"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_empty_value_treated_as_missing() {
        clear_env();
        set_required_env();
        std::env::set_var("SUMMARIZER_API_KEY", "   ");

        let result = AppConfig::from_env();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("SUMMARIZER_API_KEY"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        set_required_env();
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        std::env::set_var("SUMMARIZER_MODEL", "gpt-4o-mini");
        std::env::set_var("DIGEST_ENDPOINT", "http://localhost:8080/emails");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.summarizer.model, "gpt-4o-mini");
        assert_eq!(config.digest.endpoint, "http://localhost:8080/emails");

        clear_env();
    }
}
