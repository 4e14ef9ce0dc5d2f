//! Conversational scenarios and the orchestrator that routes to them.
//!
//! A scenario consumes one message at a time and produces one reply. The
//! orchestrator picks the scenario for each message from the user's stored
//! session, so different users can be in different flows at once.

pub mod meal;
pub mod orchestrator;
pub mod registration;
pub mod stats;
pub mod steps;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

pub use meal::MealCaptureScenario;
pub use orchestrator::ScenarioOrchestrator;
pub use registration::RegistrationScenario;
pub use stats::StatsScenario;

/// Identifies a scenario. Stored in the session as `current_scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Registration,
    MealCapture,
    Stats,
}

impl Default for ScenarioKind {
    fn default() -> Self {
        Self::Registration
    }
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registration => "registration",
            Self::MealCapture => "meal_capture",
            Self::Stats => "stats",
        };
        write!(f, "{s}")
    }
}

/// A self-contained conversational flow.
///
/// `Ok` carries the reply. On `Err`, [`ScenarioError::reply`] gives the text
/// the user should still see, when there is one.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn kind(&self) -> ScenarioKind;

    async fn handle(
        &self,
        user_id: &str,
        message: &str,
        photo_ref: &str,
    ) -> Result<String, ScenarioError>;
}

/// Generic reply for infrastructure failures.
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for kind in [
            ScenarioKind::Registration,
            ScenarioKind::MealCapture,
            ScenarioKind::Stats,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(format!("\"{kind}\""), json);
        }
    }
}
