//! SQLite plumbing for Parlor: pool preparation and embedded schema migrations.

use anyhow::Context;
use parlor_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod migrations;

pub use connection::prepare_database;
pub use migrations::{run_migrations, MIGRATOR};

/// Open the pool described by `config` and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .context("failed to prepare database")?;

    run_migrations(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_database() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 2,
        };

        let pool = initialize_database(&config).await.unwrap();
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_database_initialization_creates_schema() {
        let (pool, _temp_dir) = create_test_database().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(name,)| name).collect();

        for expected in [
            "chat_participants",
            "chats",
            "message_deliveries",
            "message_reads",
            "messages",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled_on_every_connection() {
        let (pool, _temp_dir) = create_test_database().await;

        let mut first = pool.acquire().await.unwrap();
        let mut second = pool.acquire().await.unwrap();

        for conn in [&mut first, &mut second] {
            let result: (bool,) = sqlx::query_as("PRAGMA foreign_keys")
                .fetch_one(&mut **conn)
                .await
                .unwrap();
            assert!(result.0);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (pool, _temp_dir) = create_test_database().await;
        run_migrations(&pool).await.unwrap();
    }
}
