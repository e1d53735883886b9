//! The embedded per-instance SQL store. Every agent instance owns exactly
//! one `AgentStore`; nothing is shared between instances.

pub mod error;

pub use error::{Error, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Handle to one instance's embedded database. Cheap to clone (wraps a
/// connection pool).
#[derive(Clone)]
pub struct AgentStore {
    pool: SqlitePool,
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/migrations");

impl AgentStore {
    /// Open (creating if absent) the SQLite database at `database_url` and
    /// run pending migrations.
    pub async fn open(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory database; used by tests and by instances that
    /// opt out of durability.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open("sqlite::memory:").await
    }

    /// Wrap a pool whose migrations have already been run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wipe every row from every table, leaving the schema intact. Used by
    /// `destroy()` on the agent instance.
    pub async fn wipe(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "messages",
            "stream_meta",
            "stream_chunks",
            "schedules",
            "mcp_servers",
            "agent_state",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let store = AgentStore::open_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn wipe_clears_all_tables() {
        let store = AgentStore::open_in_memory().await.unwrap();
        sqlx::query("INSERT INTO messages (id, json, role, hash, seq) VALUES ('a', '{}', 'user', 'h', 0)")
            .execute(store.pool())
            .await
            .unwrap();
        store.wipe().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn open_file_backed_db_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sqlite3");
        let url = format!("sqlite://{}", path.display());

        {
            let store = AgentStore::open(&url).await.unwrap();
            sqlx::query("INSERT INTO messages (id, json, role, hash, seq) VALUES ('a', '{}', 'user', 'h', 0)")
                .execute(store.pool())
                .await
                .unwrap();
        }

        let store = AgentStore::open(&url).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
