//! In-memory `RecordStore`, for tests and default bring-up.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{Meal, Profile, Record};
use crate::store::traits::RecordStore;

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, Profile>,
    records: Vec<Record>,
    meals: HashMap<String, Vec<Meal>>,
}

/// Records kept in process memory behind a single lock.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(entity: &str, id: impl ToString) -> DatabaseError {
    DatabaseError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_profile(&self, profile: &Profile) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError> {
        Ok(self.inner.read().await.profiles.get(user_id).cloned())
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .profiles
            .get_mut(&profile.user_id)
            .ok_or_else(|| not_found("profile", &profile.user_id))?;
        *existing = profile.clone();
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError> {
        Ok(self.inner.write().await.profiles.remove(user_id).is_some())
    }

    async fn create_record(&self, record: &Record) -> Result<(), DatabaseError> {
        self.inner.write().await.records.push(record.clone());
        Ok(())
    }

    async fn get_records(&self, user_id: &str) -> Result<Vec<Record>, DatabaseError> {
        let inner = self.inner.read().await;
        let mut records: Vec<Record> = inner
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date_time);
        Ok(records)
    }

    async fn update_record(&self, record: &Record) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| not_found("record", record.id))?;
        *existing = record.clone();
        Ok(())
    }

    async fn delete_record(&self, record_id: Uuid) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != record_id);
        Ok(inner.records.len() < before)
    }

    async fn create_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError> {
        self.inner
            .write()
            .await
            .meals
            .entry(user_id.to_string())
            .or_default()
            .push(meal.clone());
        Ok(())
    }

    async fn get_meal(&self, user_id: &str, meal_id: Uuid) -> Result<Option<Meal>, DatabaseError> {
        let inner = self.inner.read().await;
        Ok(inner
            .meals
            .get(user_id)
            .and_then(|meals| meals.iter().find(|m| m.id == meal_id))
            .cloned())
    }

    async fn list_meals(&self, user_id: &str) -> Result<Vec<Meal>, DatabaseError> {
        let mut meals = self
            .inner
            .read()
            .await
            .meals
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        meals.sort_by_key(|m| m.date_time);
        Ok(meals)
    }

    async fn update_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .meals
            .get_mut(user_id)
            .and_then(|meals| meals.iter_mut().find(|m| m.id == meal.id))
            .ok_or_else(|| not_found("meal", meal.id))?;
        *existing = meal.clone();
        Ok(())
    }

    async fn delete_meal(&self, user_id: &str, meal_id: Uuid) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.write().await;
        let Some(meals) = inner.meals.get_mut(user_id) else {
            return Ok(false);
        };
        let before = meals.len();
        meals.retain(|m| m.id != meal_id);
        Ok(meals.len() < before)
    }
}
