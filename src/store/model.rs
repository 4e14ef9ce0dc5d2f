//! Persisted domain records: profiles, nutrition history, meals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::RegistrationTarget;

/// A user's physical profile, built from a completed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub weight: i64,
    pub target_weight: i64,
    pub height: i64,
    pub activity_level: String,
    pub goal: String,
}

impl Profile {
    /// Build a profile from a registration target. Returns `None` unless
    /// every field has been collected.
    pub fn from_target(user_id: &str, target: &RegistrationTarget) -> Option<Self> {
        let weight = target.weight?;
        let target_weight = target.target_weight?;
        Some(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: target.name.clone()?,
            age: target.age?,
            gender: target.gender.clone()?,
            weight,
            target_weight,
            height: target.height?,
            activity_level: target.activity_level.clone()?,
            goal: goal_for(weight, target_weight).to_string(),
        })
    }
}

fn goal_for(weight: i64, target_weight: i64) -> &'static str {
    match target_weight.cmp(&weight) {
        std::cmp::Ordering::Less => "lose",
        std::cmp::Ordering::Greater => "gain",
        std::cmp::Ordering::Equal => "maintain",
    }
}

/// One historical nutrition entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub user_id: String,
    pub date_time: DateTime<Utc>,
    pub calories: i64,
    pub protein: i64,
    pub fat: i64,
    pub carbohydrates: i64,
    pub picture_url: String,
}

/// A captured meal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub calories: i64,
    #[serde(default)]
    pub proteins: i64,
    #[serde(default)]
    pub fats: i64,
    #[serde(default)]
    pub carbohydrates: i64,
    pub image_url: String,
    pub date_time: DateTime<Utc>,
    pub comment: String,
}

impl Meal {
    /// New meal stamped now, with unknown macros set to zero.
    pub fn new(image_url: &str, comment: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            calories: 0,
            proteins: 0,
            fats: 0,
            carbohydrates: 0,
            image_url: image_url.to_string(),
            date_time: Utc::now(),
            comment: comment.to_string(),
        }
    }
}
