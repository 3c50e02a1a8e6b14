use std::path::Path;

use anyhow::{Context, Result};
use parlor_auth::CredentialVerifier;
use parlor_chats::ChatStore;
use parlor_config::AppConfig;
use parlor_runtime::BackendServices;
use tempfile::TempDir;

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32, uploads: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config.uploads.root = uploads.to_string_lossy().into_owned();
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4, temp_dir.path());

    let services = initialise(&config).await?;
    let table: String = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'messages'",
    )
    .fetch_one(&services.db_pool)
    .await?;

    assert_eq!("messages", table);
    assert!(db_path.exists(), "sqlite database file should be created");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_applies_max_connections_setting() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/max_conn.db");
    let config = build_config(sqlite_url(&db_path), 3, temp_dir.path());

    let services = initialise(&config).await?;
    assert_eq!(3, services.db_pool.options().get_max_connections());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_without_redis_still_sends_messages() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = build_config(
        sqlite_url(&temp_dir.path().join("runtime/noop.db")),
        2,
        temp_dir.path(),
    );
    // Nothing listens on port 1, so the connection attempt fails fast.
    config.notifications.redis_url = Some("redis://127.0.0.1:1".into());

    let services = initialise(&config).await?;
    assert!(
        services.redis_conn.is_none(),
        "redis connection errors should be tolerated"
    );

    let chat = services.store.create_chat("alice", "bob").await?;
    let message = services
        .engine
        .send_message("alice", &chat.id, "hello", Vec::new())
        .await?;
    assert_eq!(message.text, "hello");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_supports_in_memory_database() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config("sqlite::memory:".into(), 4, temp_dir.path());

    let services = initialise(&config).await?;
    let chat = services.store.create_chat("alice", "bob").await?;
    assert_eq!(services.store.list_chats("bob").await?[0].id, chat.id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn verifier_accepts_tokens_signed_with_configured_secret() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = build_config("sqlite::memory:".into(), 1, temp_dir.path());
    config.auth.jwt_secret = "runtime-secret".into();

    let services = initialise(&config).await?;
    let token = services.verifier.issue("carol")?;
    assert_eq!(services.verifier.verify(&token)?.user_id, "carol");
    Ok(())
}
