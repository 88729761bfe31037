//! エラー型定義
//!
//! コア全体で使用するエラー分類。各コンポーネントはエラーを握りつぶさず
//! 呼び出し元へ伝播する。ループ境界で捕捉するのはダイジェスト
//! オーケストレーターのみ（ユーザー単位の障害分離のため）。

use thiserror::Error;

/// コアのエラー分類
///
/// - `Auth`: 認証情報が存在しない・無効・リフレッシュ不能
/// - `NotFound`: 参照先のスレッド/サマリーが存在しない
/// - `Validation`: 外部呼び出し前に検出した入力不備
/// - `Provider`: メールボックス/AI/永続化プロバイダのネットワーク・API障害
#[derive(Debug, Error)]
pub enum AppError {
    #[error("auth error: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl AppError {
    /// 認証エラーかどうか
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// NotFoundエラーかどうか
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
