//! Meal capture: one message, one meal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ScenarioError;
use crate::store::{Meal, RecordStore};
use crate::vision::VisionClient;

use super::{Scenario, ScenarioKind};

/// Reply for a meal saved without a photo.
pub const MEAL_SAVED: &str = "Your meal has been saved, thank you";

/// Records a meal, naming it from the photo when one is attached.
pub struct MealCaptureScenario {
    records: Arc<dyn RecordStore>,
    vision: Arc<dyn VisionClient>,
}

impl MealCaptureScenario {
    pub fn new(records: Arc<dyn RecordStore>, vision: Arc<dyn VisionClient>) -> Self {
        Self { records, vision }
    }
}

#[async_trait]
impl Scenario for MealCaptureScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::MealCapture
    }

    async fn handle(
        &self,
        user_id: &str,
        message: &str,
        photo_ref: &str,
    ) -> Result<String, ScenarioError> {
        let mut meal = Meal::new(photo_ref, message);

        let reply = if photo_ref.is_empty() {
            MEAL_SAVED.to_string()
        } else {
            let description = self.vision.analyze(photo_ref).await.map_err(|source| {
                warn!(user_id, error = %source, "Vision analysis failed");
                ScenarioError::Collaborator {
                    name: "vision".into(),
                    source,
                }
            })?;
            meal.name = description.clone();
            description
        };

        if let Err(source) = self.records.create_meal(user_id, &meal).await {
            let reply = format!("An error occurred while saving your meal: {source}");
            return Err(ScenarioError::Storage { source, reply });
        }

        info!(user_id, meal_id = %meal.id, with_photo = !photo_ref.is_empty(), "Meal saved");
        Ok(reply)
    }
}
