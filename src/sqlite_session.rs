//! # SQLite-Based Session Storage
//!
//! Persistent [`SessionStore`] backed by SQLite through `sqlx`. Conversation
//! history survives process restarts: reopening the same database file and
//! session id yields the same items in the same order.
//!
//! Two tables are maintained:
//!
//! - `sessions`: one row per session id with its creation time,
//! - `session_items`: the serialized [`RunItem`]s, ordered by a per-session
//!   `sequence_num`.
//!
//! Every `append` runs inside one transaction, so a batch is stored entirely or
//! not at all.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use finance_agents::items::RunItem;
//! use finance_agents::memory::{Session, SessionStore};
//! use finance_agents::sqlite_session::SqliteSessionStore;
//!
//! # #[tokio::main]
//! # async fn main() -> finance_agents::Result<()> {
//! let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new("data/session.db").await?);
//! let session = Session::open(store, "finance_session").await?;
//! session.append(vec![RunItem::user_message("How much did I spend on groceries?")]).await?;
//! assert!(!session.history(None).await?.is_empty());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentsError, Result};
use crate::items::RunItem;
use crate::memory::{SessionInfo, SessionStore};

/// A [`SessionStore`] that uses SQLite for persistent storage.
pub struct SqliteSessionStore {
    pool: Pool<Sqlite>,
    location: Option<PathBuf>,
}

impl SqliteSessionStore {
    /// Opens (creating if missing) the database at `db_path`.
    ///
    /// Parent directories are created as well.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        debug!(path = %path.display(), "Opened SQLite session store");

        Ok(Self {
            pool,
            location: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store, useful for testing.
    ///
    /// The pool holds a single connection; each SQLite in-memory connection is
    /// its own database.
    pub async fn new_in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        // The database lives in this one connection; it must never be recycled
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            location: None,
        })
    }

    async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                item_type TEXT NOT NULL,
                item_data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sequence_num INTEGER NOT NULL,
                UNIQUE(session_id, sequence_num)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_session_items_session
            ON session_items(session_id, sequence_num)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AgentsError::StorageUnavailable(format!("corrupt timestamp '{raw}': {e}")))
    }

    fn deserialize_item(data: &str) -> Result<RunItem> {
        serde_json::from_str(data)
            .map_err(|e| AgentsError::StorageUnavailable(format!("corrupt session item: {e}")))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get_or_create(&self, session_id: &str) -> Result<SessionInfo> {
        sqlx::query("INSERT OR IGNORE INTO sessions (session_id, created_at) VALUES (?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT s.created_at AS created_at, COUNT(i.id) AS item_count
            FROM sessions s
            LEFT JOIN session_items i ON i.session_id = s.session_id
            WHERE s.session_id = ?
            GROUP BY s.session_id
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let created_at: String = row.get("created_at");
        let item_count: i64 = row.get("item_count");
        Ok(SessionInfo {
            session_id: session_id.to_string(),
            created_at: Self::parse_timestamp(&created_at)?,
            item_count: item_count as usize,
        })
    }

    async fn append(&self, session_id: &str, items: Vec<RunItem>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO sessions (session_id, created_at) VALUES (?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        for item in &items {
            let item_data = serde_json::to_string(item)?;
            sqlx::query(
                r#"
                INSERT INTO session_items (session_id, item_type, item_data, created_at, sequence_num)
                SELECT ?, ?, ?, ?, COALESCE(MAX(sequence_num), 0) + 1
                FROM session_items
                WHERE session_id = ?
                "#,
            )
            .bind(session_id)
            .bind(item.kind())
            .bind(item_data)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(session_id = %session_id, count = items.len(), "Appended session items");
        Ok(())
    }

    async fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunItem>> {
        let query = if let Some(limit) = limit {
            sqlx::query(
                r#"
                SELECT item_data
                FROM session_items
                WHERE session_id = ?
                ORDER BY sequence_num DESC
                LIMIT ?
                "#,
            )
            .bind(session_id)
            .bind(limit as i64)
        } else {
            sqlx::query(
                r#"
                SELECT item_data
                FROM session_items
                WHERE session_id = ?
                ORDER BY sequence_num ASC
                "#,
            )
            .bind(session_id)
        };

        let rows = query.fetch_all(&self.pool).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("item_data");
            items.push(Self::deserialize_item(&data)?);
        }

        // Selected newest-first when limited
        if limit.is_some() {
            items.reverse();
        }

        Ok(items)
    }
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::{Role, ToolCall};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_sqlite_store_basic() {
        let store = SqliteSessionStore::new_in_memory().await.unwrap();
        let info = store.get_or_create("finance_session").await.unwrap();
        assert_eq!(info.session_id, "finance_session");
        assert_eq!(info.item_count, 0);

        store
            .append(
                "finance_session",
                vec![
                    RunItem::user_message("Hello"),
                    RunItem::assistant_message("triage_agent", "Hi there!"),
                ],
            )
            .await
            .unwrap();

        let retrieved = store.history("finance_session", None).await.unwrap();
        assert_eq!(retrieved.len(), 2);
        match &retrieved[1] {
            RunItem::Message(msg) => {
                assert_eq!(msg.content, "Hi there!");
                assert_eq!(msg.role, Role::Assistant);
                assert_eq!(msg.agent.as_deref(), Some("triage_agent"));
            }
            other => panic!("Expected Message item, got {other:?}"),
        }

        let again = store.get_or_create("finance_session").await.unwrap();
        assert_eq!(again.item_count, 2);
        assert_eq!(again.created_at, info.created_at);
    }

    #[tokio::test]
    async fn test_sqlite_store_with_limit() {
        let store = SqliteSessionStore::new_in_memory().await.unwrap();
        let items = (0..5)
            .map(|i| RunItem::user_message(format!("Message {i}")))
            .collect();
        store.append("limit", items).await.unwrap();

        let limited = store.history("limit", Some(2)).await.unwrap();
        let contents: Vec<String> = limited
            .iter()
            .filter_map(|item| match item {
                RunItem::Message(m) => Some(m.content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["Message 3", "Message 4"]);
    }

    #[tokio::test]
    async fn test_sqlite_store_complex_items_keep_order() {
        let store = SqliteSessionStore::new_in_memory().await.unwrap();
        let call = ToolCall::new("addition", serde_json::json!({"x": 1, "y": 2}));
        let items = vec![
            RunItem::user_message("Calculate something"),
            RunItem::tool_call("investment_agent", &call),
            RunItem::tool_success(&call.id, serde_json::json!(3.0)),
            RunItem::handoff("investment_agent", "wealth_agent", Some("strategy".into())),
        ];
        store.append("complex", items.clone()).await.unwrap();
        store
            .append("complex", vec![RunItem::assistant_message("wealth_agent", "Done")])
            .await
            .unwrap();

        let retrieved = store.history("complex", None).await.unwrap();
        assert_eq!(retrieved.len(), 5);
        assert_eq!(&retrieved[..4], &items[..]);
        assert_eq!(retrieved[4].kind(), "message");
    }

    #[tokio::test]
    async fn test_sqlite_sessions_are_isolated() {
        let store = SqliteSessionStore::new_in_memory().await.unwrap();
        store
            .append("user1", vec![RunItem::user_message("Message from user 1")])
            .await
            .unwrap();
        store
            .append("user2", vec![RunItem::user_message("Message from user 2")])
            .await
            .unwrap();
        store
            .append("user1", vec![RunItem::user_message("Second from user 1")])
            .await
            .unwrap();

        assert_eq!(store.history("user1", None).await.unwrap().len(), 2);
        assert_eq!(store.history("user2", None).await.unwrap().len(), 1);
        assert!(store.history("nobody", None).await.unwrap().is_empty());
    }
}
