//! Session storage
//!
//! A session is the append-only history of one conversation, keyed by a
//! session id. It is the only state that carries context from one turn to the
//! next. [`SessionStore`] is the storage seam; [`Session`] is the cheap handle
//! the runner works with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::items::{ItemHelpers, Message, RunItem};

/// Summary of a stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
}

/// Defines the interface for session storage implementations.
///
/// Appends for one session are expected to be issued sequentially; two
/// concurrent appends to the same id are both kept, in whatever order the
/// store serializes them.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Returns the session, creating an empty one on first use.
    async fn get_or_create(&self, session_id: &str) -> Result<SessionInfo>;

    /// Appends items in order. A batch is stored entirely or not at all.
    async fn append(&self, session_id: &str, items: Vec<RunItem>) -> Result<()>;

    /// Ordered history; with a limit, only the most recent `limit` items.
    async fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunItem>>;
}

/// Handle to one session in a store.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// Open (and create if needed) `session_id` in `store`.
    pub async fn open(store: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Result<Self> {
        let session_id = session_id.into();
        store.get_or_create(&session_id).await?;
        Ok(Self { session_id, store })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<RunItem>> {
        self.store.history(&self.session_id, limit).await
    }

    pub async fn append(&self, items: Vec<RunItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.store.append(&self.session_id, items).await
    }

    /// Conversation history as model messages.
    pub async fn messages(&self, limit: Option<usize>) -> Result<Vec<Message>> {
        let items = self.history(limit).await?;
        Ok(ItemHelpers::to_messages(&items))
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.history(None).await?.len())
    }
}

#[derive(Debug)]
struct StoredSession {
    created_at: DateTime<Utc>,
    items: Vec<RunItem>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, session_id: &str) -> Result<SessionInfo> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                created_at: Utc::now(),
                items: Vec::new(),
            });
        Ok(SessionInfo {
            session_id: session_id.to_string(),
            created_at: stored.created_at,
            item_count: stored.items.len(),
        })
    }

    async fn append(&self, session_id: &str, items: Vec<RunItem>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| StoredSession {
                created_at: Utc::now(),
                items: Vec::new(),
            })
            .items
            .extend(items);
        Ok(())
    }

    async fn history(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<RunItem>> {
        let sessions = self.sessions.read().await;
        let Some(stored) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let start = limit
            .map(|n| stored.items.len().saturating_sub(n))
            .unwrap_or(0);
        Ok(stored.items[start..].to_vec())
    }
}
