//! Registration scenario: walks the user through the step table, one
//! validated answer per message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, ScenarioError};
use crate::session::{RegistrationTarget, SessionStore};
use crate::store::RecordStore;
use crate::store::model::Profile;

use super::steps::{COMPLETION_MESSAGE, FieldKind, RegistrationStep, StepDefinition, StepTable};
use super::{GENERIC_FAILURE, Scenario, ScenarioKind};

/// A validated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Answer {
    Text(String),
    Number(i64),
}

impl Answer {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }

    fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Check `message` against what `def` expects.
fn validate(def: &StepDefinition, message: &str) -> Result<Answer, ScenarioError> {
    let input = message.trim();
    let reject = |reason: String| ScenarioError::Validation {
        field: def.step.to_string(),
        reason,
        reply: def.rejection.to_string(),
    };

    match def.kind {
        FieldKind::Text if input.is_empty() => Err(reject("must not be empty".into())),
        FieldKind::Text | FieldKind::Category => Ok(Answer::Text(input.to_string())),
        FieldKind::Integer => input
            .parse::<i64>()
            .map(Answer::Number)
            .map_err(|e| reject(format!("{input:?} is not an integer: {e}"))),
    }
}

/// Write an answer into the field owned by `step`.
fn record_answer(target: &mut RegistrationTarget, step: RegistrationStep, answer: Answer) {
    use RegistrationStep::*;
    match step {
        Name => target.name = Some(answer.into_text()),
        Age => target.age = answer.as_number(),
        Gender => target.gender = Some(answer.into_text()),
        Weight => target.weight = answer.as_number(),
        TargetWeight => target.target_weight = answer.as_number(),
        Height => target.height = answer.as_number(),
        ActivityLevel => target.activity_level = Some(answer.into_text()),
        Done => {}
    }
}

fn storage_failure(source: DatabaseError) -> ScenarioError {
    ScenarioError::Storage {
        source,
        reply: GENERIC_FAILURE.to_string(),
    }
}

/// Finite-state registration flow over [`StepTable`].
pub struct RegistrationScenario {
    sessions: Arc<dyn SessionStore>,
    records: Arc<dyn RecordStore>,
}

impl RegistrationScenario {
    pub fn new(sessions: Arc<dyn SessionStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { sessions, records }
    }
}

#[async_trait]
impl Scenario for RegistrationScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Registration
    }

    async fn handle(
        &self,
        user_id: &str,
        message: &str,
        _photo_ref: &str,
    ) -> Result<String, ScenarioError> {
        let Some(mut session) = self.sessions.get(user_id).await.map_err(storage_failure)? else {
            // First contact: seed the session and ask the first question.
            let session = self.sessions.create(user_id).await.map_err(storage_failure)?;
            info!(user_id, "Registration started");
            return Ok(StepTable::prompt(session.current_step).to_string());
        };

        let Some(def) = StepTable::get(session.current_step) else {
            return Ok(COMPLETION_MESSAGE.to_string());
        };

        let answer = validate(def, message)?;
        let mut target = session.target.take().unwrap_or_default();
        record_answer(&mut target, def.step, answer);
        let next = StepTable::successor(def.step);

        if next.is_terminal() {
            match Profile::from_target(user_id, &target) {
                Some(profile) => self
                    .records
                    .create_profile(&profile)
                    .await
                    .map_err(storage_failure)?,
                None => warn!(user_id, "Registration finished with missing fields"),
            }
        }

        session.target = Some(target);
        session.current_step = next;
        self.sessions
            .update(user_id, &session)
            .await
            .map_err(storage_failure)?;

        if next.is_terminal() {
            info!(user_id, "Registration complete");
        } else {
            debug!(user_id, step = %next, "Registration advanced");
        }
        Ok(StepTable::prompt(next).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionStore, UserSession};
    use crate::store::InMemoryRecordStore;
    use crate::store::testing::{FailingRecordStore, FailingSessionStore};

    fn scenario() -> (
        RegistrationScenario,
        Arc<InMemorySessionStore>,
        Arc<InMemoryRecordStore>,
    ) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let records = Arc::new(InMemoryRecordStore::new());
        (
            RegistrationScenario::new(sessions.clone(), records.clone()),
            sessions,
            records,
        )
    }

    async fn step_of(sessions: &InMemorySessionStore, user_id: &str) -> RegistrationStep {
        sessions.get(user_id).await.unwrap().unwrap().current_step
    }

    #[tokio::test]
    async fn first_message_creates_session_and_asks_name() {
        let (s, sessions, _) = scenario();
        let reply = s.handle("1", "hello there", "").await.unwrap();
        assert_eq!(reply, "What is your name?");
        assert_eq!(step_of(&sessions, "1").await, RegistrationStep::Name);
        // The greeting was not taken as the name
        assert!(sessions.get("1").await.unwrap().unwrap().target.is_none());
    }

    #[tokio::test]
    async fn full_walk() {
        let (s, sessions, records) = scenario();
        let steps = [
            ("", "What is your name?"),
            ("Ivan", "How old are you?"),
            ("25", "What is your gender?"),
            ("male", "How many kg do you weigh?"),
            ("80", "How many kg would you like to weigh?"),
            ("75", "How tall are you in cm?"),
            ("180", "What is your activity level?"),
            ("high", COMPLETION_MESSAGE),
        ];
        for (i, (input, expected)) in steps.iter().enumerate() {
            let reply = s.handle("1", input, "").await.unwrap();
            assert_eq!(&reply, expected, "step {i}");
        }

        let session = sessions.get("1").await.unwrap().unwrap();
        assert!(session.is_registered());
        let target = session.target.unwrap();
        assert_eq!(target.name.as_deref(), Some("Ivan"));
        assert_eq!(target.age, Some(25));
        assert_eq!(target.activity_level.as_deref(), Some("high"));

        let profile = records.get_profile("1").await.unwrap().unwrap();
        assert_eq!(profile.height, 180);
        assert_eq!(profile.goal, "lose");

        // Terminal state is absorbing
        for input in ["anything", "", "42"] {
            assert_eq!(s.handle("1", input, "").await.unwrap(), COMPLETION_MESSAGE);
        }
    }

    #[tokio::test]
    async fn non_numeric_rejected_on_every_integer_step() {
        use RegistrationStep::*;
        for step in [Age, Weight, TargetWeight, Height] {
            let (s, sessions, _) = scenario();
            let mut session = UserSession::new("1");
            session.current_step = step;
            sessions.update("1", &session).await.unwrap();

            let err = s.handle("1", "abc", "").await.unwrap_err();
            assert!(err.is_validation(), "{step}");
            assert_eq!(err.reply(), Some(StepTable::get(step).unwrap().rejection));
            assert_eq!(step_of(&sessions, "1").await, step);
            assert!(sessions.get("1").await.unwrap().unwrap().target.is_none());
        }
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let (s, sessions, _) = scenario();
        s.handle("1", "", "").await.unwrap();

        let err = s.handle("1", "   ", "").await.unwrap_err();
        assert_eq!(err.reply(), Some("You entered an invalid name"));
        assert_eq!(step_of(&sessions, "1").await, RegistrationStep::Name);
    }

    #[tokio::test]
    async fn category_accepted_verbatim() {
        let (s, sessions, _) = scenario();
        let mut session = UserSession::new("1");
        session.current_step = RegistrationStep::Gender;
        sessions.update("1", &session).await.unwrap();

        s.handle("1", "prefer not to say", "").await.unwrap();
        let session = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(session.current_step, RegistrationStep::Weight);
        assert_eq!(
            session.target.unwrap().gender.as_deref(),
            Some("prefer not to say")
        );
    }

    #[tokio::test]
    async fn integer_input_is_trimmed() {
        let (s, sessions, _) = scenario();
        let mut session = UserSession::new("1");
        session.current_step = RegistrationStep::Age;
        sessions.update("1", &session).await.unwrap();

        s.handle("1", " 31 \n", "").await.unwrap();
        let session = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(session.target.unwrap().age, Some(31));
    }

    #[tokio::test]
    async fn profile_write_failure_keeps_last_step() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let s = RegistrationScenario::new(sessions.clone(), Arc::new(FailingRecordStore));
        let mut session = UserSession::new("1");
        session.current_step = RegistrationStep::ActivityLevel;
        session.target = Some(RegistrationTarget {
            name: Some("Ivan".into()),
            age: Some(25),
            gender: Some("male".into()),
            weight: Some(80),
            target_weight: Some(75),
            height: Some(180),
            activity_level: None,
        });
        sessions.update("1", &session).await.unwrap();

        let err = s.handle("1", "high", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Storage { .. }));
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));
        assert_eq!(step_of(&sessions, "1").await, RegistrationStep::ActivityLevel);
    }

    #[tokio::test]
    async fn session_lookup_failure_gets_generic_reply() {
        let s = RegistrationScenario::new(
            Arc::new(FailingSessionStore::offline()),
            Arc::new(InMemoryRecordStore::new()),
        );
        let err = s.handle("1", "Ivan", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Storage { .. }));
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn first_contact_seed_failure_gets_generic_reply() {
        let s = RegistrationScenario::new(
            Arc::new(FailingSessionStore::read_only([]).await),
            Arc::new(InMemoryRecordStore::new()),
        );
        let err = s.handle("1", "hello", "").await.unwrap_err();
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn session_write_failure_does_not_advance() {
        let mut session = UserSession::new("1");
        session.current_step = RegistrationStep::Age;
        let sessions = Arc::new(FailingSessionStore::read_only([session]).await);
        let s = RegistrationScenario::new(sessions.clone(), Arc::new(InMemoryRecordStore::new()));

        let err = s.handle("1", "25", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Storage { .. }));
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));

        let stored = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(stored.current_step, RegistrationStep::Age);
        assert!(stored.target.is_none());
    }

    #[test]
    fn validate_kinds() {
        let name = StepTable::get(RegistrationStep::Name).unwrap();
        assert_eq!(validate(name, " Ivan ").unwrap(), Answer::Text("Ivan".into()));

        let age = StepTable::get(RegistrationStep::Age).unwrap();
        assert_eq!(validate(age, "-3").unwrap(), Answer::Number(-3));
        assert!(validate(age, "2.5").is_err());
        assert!(validate(age, "").is_err());
    }
}
