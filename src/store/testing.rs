//! Test doubles for storage failure paths.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{InMemorySessionStore, SessionStore, UserSession};
use crate::store::model::{Meal, Profile, Record};
use crate::store::traits::RecordStore;

/// Record store that fails every write and reads as empty.
pub(crate) struct FailingRecordStore;

fn offline() -> DatabaseError {
    DatabaseError::Query("database offline".into())
}

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn create_profile(&self, _: &Profile) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn get_profile(&self, _: &str) -> Result<Option<Profile>, DatabaseError> {
        Ok(None)
    }
    async fn update_profile(&self, _: &Profile) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn delete_profile(&self, _: &str) -> Result<bool, DatabaseError> {
        Err(offline())
    }
    async fn create_record(&self, _: &Record) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn get_records(&self, _: &str) -> Result<Vec<Record>, DatabaseError> {
        Ok(Vec::new())
    }
    async fn update_record(&self, _: &Record) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn delete_record(&self, _: Uuid) -> Result<bool, DatabaseError> {
        Err(offline())
    }
    async fn create_meal(&self, _: &str, _: &Meal) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn get_meal(&self, _: &str, _: Uuid) -> Result<Option<Meal>, DatabaseError> {
        Ok(None)
    }
    async fn list_meals(&self, _: &str) -> Result<Vec<Meal>, DatabaseError> {
        Err(offline())
    }
    async fn update_meal(&self, _: &str, _: &Meal) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn delete_meal(&self, _: &str, _: Uuid) -> Result<bool, DatabaseError> {
        Err(offline())
    }
}

/// Session store whose writes always fail. Reads fail as well unless the
/// store was built with [`FailingSessionStore::read_only`].
pub(crate) struct FailingSessionStore {
    inner: InMemorySessionStore,
    readable: bool,
}

impl FailingSessionStore {
    pub(crate) fn offline() -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            readable: false,
        }
    }

    /// Serves `seed` on reads and rejects every write.
    pub(crate) async fn read_only(seed: impl IntoIterator<Item = UserSession>) -> Self {
        let inner = InMemorySessionStore::new();
        for session in seed {
            inner.update(&session.user_id, &session).await.unwrap();
        }
        Self {
            inner,
            readable: true,
        }
    }
}

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserSession>, DatabaseError> {
        if !self.readable {
            return Err(offline());
        }
        self.inner.get(user_id).await
    }
    async fn create(&self, _: &str) -> Result<UserSession, DatabaseError> {
        Err(offline())
    }
    async fn update(&self, _: &str, _: &UserSession) -> Result<(), DatabaseError> {
        Err(offline())
    }
    async fn delete(&self, _: &str) -> Result<(), DatabaseError> {
        Err(offline())
    }
}
