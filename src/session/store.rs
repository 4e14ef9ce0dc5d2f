//! `SessionStore` trait: keyed persistence of per-user dialogue state.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::session::model::UserSession;

/// Backend-agnostic session persistence.
///
/// Implemented by [`InMemorySessionStore`](super::InMemorySessionStore) and by
/// the libSQL document backend. All backends share the same semantics.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a user's session. `Ok(None)` means the user has none yet;
    /// an error is returned only when the backend fails or the stored
    /// document is corrupt.
    async fn get(&self, user_id: &str) -> Result<Option<UserSession>, DatabaseError>;

    /// Write the seed session for `user_id`, replacing any existing one,
    /// and return it.
    async fn create(&self, user_id: &str) -> Result<UserSession, DatabaseError>;

    /// Persist `session` for `user_id`.
    async fn update(&self, user_id: &str, session: &UserSession) -> Result<(), DatabaseError>;

    /// Remove a user's session. Deleting an unknown user is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), DatabaseError>;
}
