//! Per-user dialogue state.

use serde::{Deserialize, Serialize};

use crate::scenarios::ScenarioKind;
use crate::scenarios::steps::RegistrationStep;

/// Fields collected by the registration scenario.
///
/// A field is `Some` only once its step has been answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationTarget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub target_weight: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub activity_level: Option<String>,
}

/// Durable state of one user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    #[serde(default)]
    pub current_scenario: ScenarioKind,
    #[serde(default)]
    pub current_step: RegistrationStep,
    #[serde(default)]
    pub target: Option<RegistrationTarget>,
}

impl UserSession {
    /// Seed session: registration scenario, first step, nothing collected.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            current_scenario: ScenarioKind::Registration,
            current_step: RegistrationStep::default(),
            target: None,
        }
    }

    /// Whether the registration dialogue has been completed.
    pub fn is_registered(&self) -> bool {
        self.current_step.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_session() {
        let session = UserSession::new("42");
        assert_eq!(session.user_id, "42");
        assert_eq!(session.current_scenario, ScenarioKind::Registration);
        assert_eq!(session.current_step, RegistrationStep::Name);
        assert!(session.target.is_none());
        assert!(!session.is_registered());
    }

    #[test]
    fn session_tolerates_missing_fields() {
        // Documents written by older versions may only carry the user id
        let session: UserSession = serde_json::from_str(r#"{"user_id": "7"}"#).unwrap();
        assert_eq!(session, UserSession::new("7"));
    }

    #[test]
    fn session_serde_roundtrip() {
        let session = UserSession {
            user_id: "1".into(),
            current_scenario: ScenarioKind::MealCapture,
            current_step: RegistrationStep::Height,
            target: Some(RegistrationTarget {
                name: Some("Ivan".into()),
                age: Some(25),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["current_scenario"], "meal_capture");
        assert_eq!(json["current_step"], "height");
        assert_eq!(json["target"]["name"], "Ivan");

        let parsed: UserSession = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, session);
    }
}
