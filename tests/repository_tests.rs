//! SQLiteリポジトリ実装の結合テスト

use maa_lib::repository::{
    self, ReplyRepository, SqliteReplyRepository, SqliteSummaryRepository, SqliteTokenRepository,
    SuggestedAction, SummaryRepository, TokenRepository, UpsertThreadSummary, UpsertUserToken,
    Urgency,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

// テスト用のデータベースプールを作成
async fn create_test_pool() -> sqlx::SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .unwrap();

    repository::init_schema(&pool).await.unwrap();
    pool
}

fn upsert_token(user_id: &str, expiry_date: i64) -> UpsertUserToken {
    UpsertUserToken {
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        access_token: "access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
        scope: "mail.readonly".to_string(),
        token_type: "Bearer".to_string(),
        expiry_date,
    }
}

fn upsert_summary(thread_id: &str, user_id: &str) -> UpsertThreadSummary {
    UpsertThreadSummary {
        thread_id: thread_id.to_string(),
        user_id: user_id.to_string(),
        subject: "Subject".to_string(),
        summary: "Summary text".to_string(),
        urgency: Urgency::Medium,
        suggested_action: SuggestedAction::Reply,
    }
}

#[tokio::test]
async fn test_create_pool_creates_database_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("maa_test.db");

    let pool = maa_lib::create_pool(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap();
    repository::init_schema(&pool).await.unwrap();

    let repo = SqliteTokenRepository::new(pool);
    repo.upsert_token(upsert_token("user-1", 1000)).await.unwrap();

    assert!(db_path.exists());
}

#[tokio::test]
async fn test_init_schema_is_idempotent() {
    let pool = create_test_pool().await;
    // 2回適用してもエラーにならない（IF NOT EXISTS）
    repository::init_schema(&pool).await.unwrap();
}

#[tokio::test]
async fn test_token_upsert_keeps_single_row_per_user() {
    let pool = create_test_pool().await;
    let repo = SqliteTokenRepository::new(pool.clone());

    let first = repo.upsert_token(upsert_token("user-1", 1000)).await.unwrap();
    assert_eq!(first.expiry_date, 1000);

    let mut updated = upsert_token("user-1", 2000);
    updated.access_token = "access-2".to_string();
    let second = repo.upsert_token(updated).await.unwrap();

    assert_eq!(second.access_token, "access-2");
    assert_eq!(second.expiry_date, 2000);
    // created_at は最初の行の値を保持する
    assert_eq!(second.created_at, first.created_at);

    // 同一ユーザーの行は1つだけ
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_tokens WHERE user_id = ?")
        .bind("user-1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, 1);
}

#[tokio::test]
async fn test_token_get_missing_returns_none() {
    let pool = create_test_pool().await;
    let repo = SqliteTokenRepository::new(pool);

    let token = repo.get_token("nobody").await.unwrap();
    assert!(token.is_none());
}

#[tokio::test]
async fn test_token_delete_and_list() {
    let pool = create_test_pool().await;
    let repo = SqliteTokenRepository::new(pool);

    repo.upsert_token(upsert_token("user-1", 1000)).await.unwrap();
    repo.upsert_token(upsert_token("user-2", 1000)).await.unwrap();

    let all = repo.list_tokens().await.unwrap();
    assert_eq!(all.len(), 2);

    repo.delete_token("user-1").await.unwrap();
    let remaining = repo.list_tokens().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, "user-2");
}

#[tokio::test]
async fn test_summary_upsert_unique_per_thread_and_user() {
    let pool = create_test_pool().await;
    let repo = SqliteSummaryRepository::new(pool.clone());

    let first = repo.upsert_summary(upsert_summary("t1", "user-1")).await.unwrap();

    let mut updated = upsert_summary("t1", "user-1");
    updated.summary = "Updated summary".to_string();
    updated.urgency = Urgency::High;
    let second = repo.upsert_summary(updated).await.unwrap();

    // 同じ (thread_id, user_id) は上書きされ、idは変わらない
    assert_eq!(second.id, first.id);
    assert_eq!(second.summary, "Updated summary");
    assert_eq!(second.urgency, Urgency::High);

    // 別ユーザーの同じスレッドは独立した行
    repo.upsert_summary(upsert_summary("t1", "user-2")).await.unwrap();
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM thread_summaries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.0, 2);
}

#[tokio::test]
async fn test_summary_queries() {
    let pool = create_test_pool().await;
    let repo = SqliteSummaryRepository::new(pool);

    let saved = repo.upsert_summary(upsert_summary("t1", "user-1")).await.unwrap();
    repo.upsert_summary(upsert_summary("t2", "user-1")).await.unwrap();
    repo.upsert_summary(upsert_summary("t3", "user-2")).await.unwrap();

    let for_user = repo.get_summaries_for_user("user-1").await.unwrap();
    assert_eq!(for_user.len(), 2);

    let by_id = repo.get_summary_by_id(&saved.id).await.unwrap().unwrap();
    assert_eq!(by_id.thread_id, "t1");

    let by_thread = repo
        .get_summary_by_thread("t3", "user-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_thread.user_id, "user-2");

    assert!(repo.get_summary_by_id("no-such-id").await.unwrap().is_none());
    assert!(repo
        .get_summary_by_thread("t1", "user-9")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_summary_update_suggested_action() {
    let pool = create_test_pool().await;
    let repo = SqliteSummaryRepository::new(pool);

    repo.upsert_summary(upsert_summary("t1", "user-1")).await.unwrap();
    repo.update_suggested_action("t1", "user-1", SuggestedAction::Replied)
        .await
        .unwrap();

    let summary = repo
        .get_summary_by_thread("t1", "user-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.suggested_action, SuggestedAction::Replied);

    // 存在しないサマリーの更新はエラーにしない
    repo.update_suggested_action("t9", "user-1", SuggestedAction::Replied)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reply_append_and_queries() {
    let pool = create_test_pool().await;
    let repo = SqliteReplyRepository::new(pool.clone());

    let reply = repo.append_reply("t1", "user-1", "first").await.unwrap();
    assert!(!reply.id.is_empty());
    repo.append_reply("t1", "user-1", "second").await.unwrap();
    repo.append_reply("t2", "user-2", "other").await.unwrap();

    // 追記専用: 同じスレッドへの返信は行が増える
    let for_thread = repo.get_replies_for_thread("t1").await.unwrap();
    assert_eq!(for_thread.len(), 2);

    let for_user = repo.get_replies_for_user("user-2").await.unwrap();
    assert_eq!(for_user.len(), 1);
    assert_eq!(for_user[0].message, "other");
}
