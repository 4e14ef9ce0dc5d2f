//! Summary of a user's meal history.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScenarioError;
use crate::store::{Meal, RecordStore};

use super::{GENERIC_FAILURE, Scenario, ScenarioKind};

pub const NO_MEALS: &str = "You have not logged any meals yet.";

#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    meals: usize,
    calories: i64,
    proteins: i64,
    fats: i64,
    carbohydrates: i64,
}

impl Totals {
    fn from_meals(meals: &[Meal]) -> Self {
        meals.iter().fold(Self::default(), |mut t, m| {
            t.meals += 1;
            t.calories += m.calories;
            t.proteins += m.proteins;
            t.fats += m.fats;
            t.carbohydrates += m.carbohydrates;
            t
        })
    }

    fn render(&self) -> String {
        format!(
            "Meals logged: {}\nCalories: {} kcal\nProteins: {} g\nFats: {} g\nCarbohydrates: {} g",
            self.meals, self.calories, self.proteins, self.fats, self.carbohydrates
        )
    }
}

pub struct StatsScenario {
    records: Arc<dyn RecordStore>,
}

impl StatsScenario {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Scenario for StatsScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Stats
    }

    async fn handle(
        &self,
        user_id: &str,
        _message: &str,
        _photo_ref: &str,
    ) -> Result<String, ScenarioError> {
        let meals = self
            .records
            .list_meals(user_id)
            .await
            .map_err(|source| ScenarioError::Storage {
                source,
                reply: GENERIC_FAILURE.to_string(),
            })?;

        if meals.is_empty() {
            return Ok(NO_MEALS.to_string());
        }
        Ok(Totals::from_meals(&meals).render())
    }
}
