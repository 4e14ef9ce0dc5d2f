//! `RecordStore` trait. CRUD over profiles, nutrition records and meals.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::model::{Meal, Profile, Record};

/// Backend-agnostic storage for persisted domain records, keyed by user id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Profiles ────────────────────────────────────────────────────

    /// Insert or replace the profile for `profile.user_id`.
    async fn create_profile(&self, profile: &Profile) -> Result<(), DatabaseError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError>;

    /// Update an existing profile. Fails with `NotFound` if there is none.
    async fn update_profile(&self, profile: &Profile) -> Result<(), DatabaseError>;

    /// Returns whether a profile was deleted.
    async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError>;

    // ── Records ─────────────────────────────────────────────────────

    async fn create_record(&self, record: &Record) -> Result<(), DatabaseError>;

    /// A user's records, oldest first. Empty when there are none.
    async fn get_records(&self, user_id: &str) -> Result<Vec<Record>, DatabaseError>;

    async fn update_record(&self, record: &Record) -> Result<(), DatabaseError>;

    async fn delete_record(&self, record_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Meals ───────────────────────────────────────────────────────

    /// Append a meal to the user's history.
    async fn create_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError>;

    async fn get_meal(&self, user_id: &str, meal_id: Uuid) -> Result<Option<Meal>, DatabaseError>;

    /// A user's meal history, oldest first.
    async fn list_meals(&self, user_id: &str) -> Result<Vec<Meal>, DatabaseError>;

    async fn update_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError>;

    async fn delete_meal(&self, user_id: &str, meal_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Pictures ────────────────────────────────────────────────────

    /// Copy a picture into durable storage and return its new location.
    async fn upload_picture(&self, _picture_url: &str) -> Result<String, DatabaseError> {
        Err(DatabaseError::NotImplemented("upload_picture".into()))
    }
}
