//! In-memory session backend, for tests and default bring-up.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DatabaseError;
use crate::session::model::UserSession;
use crate::session::store::SessionStore;

/// Sessions kept in a lock-guarded map. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserSession>, DatabaseError> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn create(&self, user_id: &str) -> Result<UserSession, DatabaseError> {
        let session = UserSession::new(user_id);
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session.clone());
        debug!(user_id, "Session created");
        Ok(session)
    }

    async fn update(&self, user_id: &str, session: &UserSession) -> Result<(), DatabaseError> {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.sessions.write().await.remove(user_id);
        debug!(user_id, "Session deleted");
        Ok(())
    }
}
