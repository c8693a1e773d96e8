//! SQLite-backed user store (sqlx).
//!
//! The schema is created on `migrate`. With `unique_email` the email column
//! carries a unique index, so a losing concurrent insert fails instead of
//! creating a duplicate.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::model::{NewUserRecord, UserRecord};
use crate::domain::repo::UserStore;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id         BLOB PRIMARY KEY NOT NULL,
    email      TEXT NOT NULL,
    name       TEXT,
    picture    TEXT,
    created_at TEXT NOT NULL
)"#;

const CREATE_UNIQUE_EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_unique ON users (email)";

const CREATE_EMAIL_INDEX: &str = "CREATE INDEX IF NOT EXISTS users_email_idx ON users (email)";

#[derive(Debug, Clone)]
pub struct SqliteStoreOptions {
    pub max_conns: u32,
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            max_conns: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    picture: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            picture: row.picture,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// `sqlite::memory:` is pinned to a single connection so every query sees
    /// the same database.
    pub async fn connect(url: &str, opts: &SqliteStoreOptions) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let connect_opts = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid sqlite DSN '{url}'"))?
            .create_if_missing(true)
            .busy_timeout(opts.busy_timeout);

        let max_conns = if in_memory { 1 } else { opts.max_conns.max(1) };
        let mut pool_opts = SqlitePoolOptions::new()
            .max_connections(max_conns)
            .acquire_timeout(opts.acquire_timeout);
        if in_memory {
            // An idle in-memory connection must never be reaped.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_opts
            .connect_with(connect_opts)
            .await
            .with_context(|| format!("cannot open sqlite database '{url}'"))?;
        info!(max_conns, in_memory, "Connected user store");
        Ok(Self { pool })
    }

    pub async fn migrate(&self, unique_email: bool) -> anyhow::Result<()> {
        sqlx::query(CREATE_USERS_TABLE)
            .execute(&self.pool)
            .await
            .context("create users table failed")?;
        let index = if unique_email {
            CREATE_UNIQUE_EMAIL_INDEX
        } else {
            CREATE_EMAIL_INDEX
        };
        sqlx::query(index)
            .execute(&self.pool)
            .await
            .context("create email index failed")?;
        debug!(unique_email, "User store schema ready");
        Ok(())
    }

    pub async fn count_for(&self, email: &str) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("count failed")?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Vec<UserRecord>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, email, name, picture, created_at FROM users \
             WHERE email = ? ORDER BY created_at, rowid",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .context("find_by_email failed")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(&self, record: NewUserRecord) -> anyhow::Result<UserRecord> {
        let stored = UserRecord {
            id: Uuid::new_v4(),
            email: record.email,
            name: record.name,
            picture: record.picture,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, email, name, picture, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(stored.id)
        .bind(&stored.email)
        .bind(&stored.name)
        .bind(&stored.picture)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await
        .context("insert failed")?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store(unique_email: bool) -> SqliteUserStore {
        let store = SqliteUserStore::connect("sqlite::memory:", &SqliteStoreOptions::default())
            .await
            .unwrap();
        store.migrate(unique_email).await.unwrap();
        store
    }

    fn new_record(email: &str, name: Option<&str>) -> NewUserRecord {
        NewUserRecord {
            name: name.map(str::to_string),
            email: email.into(),
            picture: Some("https://img/p.png".into()),
        }
    }

    #[tokio::test]
    async fn insert_then_find_roundtrips_record() {
        let store = memory_store(true).await;
        let inserted = store
            .insert(new_record("a@example.com", Some("Alex")))
            .await
            .unwrap();

        let found = store.find_by_email("a@example.com").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inserted.id);
        assert_eq!(found[0].name.as_deref(), Some("Alex"));
        assert_eq!(found[0].picture.as_deref(), Some("https://img/p.png"));
        assert!(store.find_by_email("b@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn null_profile_fields_survive() {
        let store = memory_store(true).await;
        store
            .insert(NewUserRecord {
                name: None,
                email: "n@example.com".into(),
                picture: None,
            })
            .await
            .unwrap();
        let found = store.find_by_email("n@example.com").await.unwrap();
        assert_eq!(found[0].name, None);
        assert_eq!(found[0].picture, None);
    }

    #[tokio::test]
    async fn unique_index_rejects_second_insert() {
        let store = memory_store(true).await;
        store.insert(new_record("u@example.com", None)).await.unwrap();
        assert!(store.insert(new_record("u@example.com", None)).await.is_err());
        assert_eq!(store.count_for("u@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn without_unique_index_duplicates_come_back_oldest_first() {
        let store = memory_store(false).await;
        let first = store.insert(new_record("d@example.com", Some("one"))).await.unwrap();
        let second = store.insert(new_record("d@example.com", Some("two"))).await.unwrap();

        let found = store.find_by_email("d@example.com").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, first.id);
        assert_eq!(found[1].id, second.id);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = memory_store(true).await;
        store.migrate(true).await.unwrap();
        store.insert(new_record("i@example.com", None)).await.unwrap();
        store.migrate(true).await.unwrap();
        assert_eq!(store.count_for("i@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn file_database_persists_across_connections() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}",
            tmp.path().join("users.db").to_string_lossy().replace('\\', "/")
        );

        let store = SqliteUserStore::connect(&url, &SqliteStoreOptions::default())
            .await
            .unwrap();
        store.migrate(true).await.unwrap();
        let inserted = store.insert(new_record("f@example.com", None)).await.unwrap();
        store.close().await;

        let reopened = SqliteUserStore::connect(&url, &SqliteStoreOptions::default())
            .await
            .unwrap();
        let found = reopened.find_by_email("f@example.com").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inserted.id);
        assert_eq!(found[0].email, inserted.email);
    }
}
