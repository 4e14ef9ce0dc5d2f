//! libSQL backend: document-style session storage plus the `RecordStore`.
//!
//! Sessions are stored as one JSON document per user. Updates are merged
//! into the existing document with `json_patch`, so fields written by other
//! components survive partial writes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{SessionStore, UserSession};
use crate::store::migrations;
use crate::store::model::{Meal, Profile, Record};
use crate::store::traits::RecordStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Merge `document` into the stored session document, creating it if
    /// absent. Keys set to `null` in `document` are removed.
    ///
    /// The update arm patches with the bound parameter, not
    /// `excluded.document`: the inserted value has already had its nulls
    /// stripped by `json_patch('{}', ..)`.
    async fn merge_session_document(
        &self,
        user_id: &str,
        document: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let document = serde_json::to_string(document)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO sessions (user_id, document, updated_at) VALUES (?1, json_patch('{}', ?2), ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                    document = json_patch(sessions.document, ?2),
                    updated_at = excluded.updated_at",
                params![user_id, document, now_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("merge_session_document: {e}")))?;
        Ok(())
    }

    /// Raw stored session document, including fields this crate does not model.
    pub async fn session_document(
        &self,
        user_id: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT document FROM sessions WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("session_document: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("session_document row: {e}")))?;
                let value = serde_json::from_str(&raw).map_err(|e| {
                    DatabaseError::Serialization(format!("corrupt session for {user_id}: {e}"))
                })?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("session_document: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 so text order is time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn now_str() -> String {
    format_datetime(&Utc::now())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s}: {e}")))
}

fn row_err(ctx: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{ctx} row parse: {e}"))
}

const PROFILE_COLUMNS: &str =
    "id, user_id, name, age, gender, weight, target_weight, height, activity_level, goal";

const RECORD_COLUMNS: &str =
    "id, user_id, date_time, calories, protein, fat, carbohydrates, picture_url";

const MEAL_COLUMNS: &str =
    "id, name, calories, proteins, fats, carbohydrates, image_url, date_time, comment";

fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let err = row_err("profile");
    let id: String = row.get(0).map_err(&err)?;
    Ok(Profile {
        id: parse_uuid(&id)?,
        user_id: row.get(1).map_err(&err)?,
        name: row.get(2).map_err(&err)?,
        age: row.get(3).map_err(&err)?,
        gender: row.get(4).map_err(&err)?,
        weight: row.get(5).map_err(&err)?,
        target_weight: row.get(6).map_err(&err)?,
        height: row.get(7).map_err(&err)?,
        activity_level: row.get(8).map_err(&err)?,
        goal: row.get(9).map_err(&err)?,
    })
}

fn row_to_record(row: &libsql::Row) -> Result<Record, DatabaseError> {
    let err = row_err("record");
    let id: String = row.get(0).map_err(&err)?;
    let date_time: String = row.get(2).map_err(&err)?;
    Ok(Record {
        id: parse_uuid(&id)?,
        user_id: row.get(1).map_err(&err)?,
        date_time: parse_datetime(&date_time)?,
        calories: row.get(3).map_err(&err)?,
        protein: row.get(4).map_err(&err)?,
        fat: row.get(5).map_err(&err)?,
        carbohydrates: row.get(6).map_err(&err)?,
        picture_url: row.get(7).map_err(&err)?,
    })
}

fn row_to_meal(row: &libsql::Row) -> Result<Meal, DatabaseError> {
    let err = row_err("meal");
    let id: String = row.get(0).map_err(&err)?;
    let date_time: String = row.get(7).map_err(&err)?;
    Ok(Meal {
        id: parse_uuid(&id)?,
        name: row.get(1).map_err(&err)?,
        calories: row.get(2).map_err(&err)?,
        proteins: row.get(3).map_err(&err)?,
        fats: row.get(4).map_err(&err)?,
        carbohydrates: row.get(5).map_err(&err)?,
        image_url: row.get(6).map_err(&err)?,
        date_time: parse_datetime(&date_time)?,
        comment: row.get(8).map_err(&err)?,
    })
}

// ── Sessions ────────────────────────────────────────────────────────

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn get(&self, user_id: &str) -> Result<Option<UserSession>, DatabaseError> {
        let Some(document) = self.session_document(user_id).await? else {
            return Ok(None);
        };
        let session = serde_json::from_value(document).map_err(|e| {
            DatabaseError::Serialization(format!("corrupt session for {user_id}: {e}"))
        })?;
        Ok(Some(session))
    }

    async fn create(&self, user_id: &str) -> Result<UserSession, DatabaseError> {
        let session = UserSession::new(user_id);
        self.update(user_id, &session).await?;
        debug!(user_id, "Session created");
        Ok(session)
    }

    async fn update(&self, user_id: &str, session: &UserSession) -> Result<(), DatabaseError> {
        let document = serde_json::to_value(session)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.merge_session_document(user_id, &document).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        debug!(user_id, "Session deleted");
        Ok(())
    }
}

// ── Records ─────────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn create_profile(&self, profile: &Profile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO profiles (id, user_id, name, age, gender, weight, target_weight, height, activity_level, goal, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (user_id) DO UPDATE SET
                    id = ?1, name = ?3, age = ?4, gender = ?5, weight = ?6, target_weight = ?7,
                    height = ?8, activity_level = ?9, goal = ?10, updated_at = ?11",
                params![
                    profile.id.to_string(),
                    profile.user_id.as_str(),
                    profile.name.as_str(),
                    profile.age,
                    profile.gender.as_str(),
                    profile.weight,
                    profile.target_weight,
                    profile.height,
                    profile.activity_level.as_str(),
                    profile.goal.as_str(),
                    now_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_profile: {e}")))?;
        debug!(user_id = %profile.user_id, "Profile stored");
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn update_profile(&self, profile: &Profile) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE profiles SET name = ?1, age = ?2, gender = ?3, weight = ?4, target_weight = ?5,
                    height = ?6, activity_level = ?7, goal = ?8, updated_at = ?9
                 WHERE user_id = ?10",
                params![
                    profile.name.as_str(),
                    profile.age,
                    profile.gender.as_str(),
                    profile.weight,
                    profile.target_weight,
                    profile.height,
                    profile.activity_level.as_str(),
                    profile.goal.as_str(),
                    now_str(),
                    profile.user_id.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_profile: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".into(),
                id: profile.user_id.clone(),
            });
        }
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM profiles WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_profile: {e}")))?;
        Ok(count > 0)
    }

    async fn create_record(&self, record: &Record) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO records ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    record.id.to_string(),
                    record.user_id.as_str(),
                    format_datetime(&record.date_time),
                    record.calories,
                    record.protein,
                    record.fat,
                    record.carbohydrates,
                    record.picture_url.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_record: {e}")))?;
        Ok(())
    }

    async fn get_records(&self, user_id: &str) -> Result<Vec<Record>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records WHERE user_id = ?1 ORDER BY date_time ASC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_records: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn update_record(&self, record: &Record) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE records SET date_time = ?1, calories = ?2, protein = ?3, fat = ?4,
                    carbohydrates = ?5, picture_url = ?6
                 WHERE id = ?7",
                params![
                    format_datetime(&record.date_time),
                    record.calories,
                    record.protein,
                    record.fat,
                    record.carbohydrates,
                    record.picture_url.as_str(),
                    record.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_record: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "record".into(),
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_record(&self, record_id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM records WHERE id = ?1",
                params![record_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_record: {e}")))?;
        Ok(count > 0)
    }

    async fn create_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO meals (id, user_id, name, calories, proteins, fats, carbohydrates, image_url, date_time, comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    meal.id.to_string(),
                    user_id,
                    meal.name.as_str(),
                    meal.calories,
                    meal.proteins,
                    meal.fats,
                    meal.carbohydrates,
                    meal.image_url.as_str(),
                    format_datetime(&meal.date_time),
                    meal.comment.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_meal: {e}")))?;
        debug!(user_id, meal_id = %meal.id, "Meal stored");
        Ok(())
    }

    async fn get_meal(&self, user_id: &str, meal_id: Uuid) -> Result<Option<Meal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1 AND id = ?2"),
                params![user_id, meal_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_meal: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_meal(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_meal: {e}"))),
        }
    }

    async fn list_meals(&self, user_id: &str) -> Result<Vec<Meal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1 ORDER BY date_time ASC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_meals: {e}")))?;

        let mut meals = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_meals: {e}")))?
        {
            meals.push(row_to_meal(&row)?);
        }
        Ok(meals)
    }

    async fn update_meal(&self, user_id: &str, meal: &Meal) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE meals SET name = ?1, calories = ?2, proteins = ?3, fats = ?4, carbohydrates = ?5,
                    image_url = ?6, date_time = ?7, comment = ?8
                 WHERE user_id = ?9 AND id = ?10",
                params![
                    meal.name.as_str(),
                    meal.calories,
                    meal.proteins,
                    meal.fats,
                    meal.carbohydrates,
                    meal.image_url.as_str(),
                    format_datetime(&meal.date_time),
                    meal.comment.as_str(),
                    user_id,
                    meal.id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_meal: {e}")))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "meal".into(),
                id: meal.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_meal(&self, user_id: &str, meal_id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM meals WHERE user_id = ?1 AND id = ?2",
                params![user_id, meal_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_meal: {e}")))?;
        Ok(count > 0)
    }
}
