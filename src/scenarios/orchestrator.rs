//! Routes each message to the scenario recorded in the user's session.
//!
//! Slash commands are handled here, before dispatch, because they move a
//! user between scenarios. Messages from one user are processed strictly
//! one at a time; different users proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{DatabaseError, ScenarioError};
use crate::session::SessionStore;

use super::steps::StepTable;
use super::{GENERIC_FAILURE, Scenario, ScenarioKind};

pub const MEAL_HINT: &str = "Send a photo of your meal, or describe what you ate.";
pub const SESSION_RESET: &str = "Your session has been reset. Send /start to begin again.";

/// Commands that change which scenario a user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Meal,
    Stats,
    Cancel,
}

impl Command {
    /// Recognise a command at the start of `message`. Accepts the
    /// `/cmd@botname` form Telegram uses in group chats.
    pub fn parse(message: &str) -> Option<Self> {
        let word = message.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" | "register" => Some(Self::Start),
            "meal" => Some(Self::Meal),
            "stats" => Some(Self::Stats),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

fn storage_failure(source: DatabaseError) -> ScenarioError {
    ScenarioError::Storage {
        source,
        reply: GENERIC_FAILURE.to_string(),
    }
}

type UserLock = Arc<tokio::sync::Mutex<()>>;

pub struct ScenarioOrchestrator {
    sessions: Arc<dyn SessionStore>,
    scenarios: HashMap<ScenarioKind, Arc<dyn Scenario>>,
    default_kind: ScenarioKind,
    timeout: Duration,
    user_locks: Mutex<HashMap<String, UserLock>>,
}

impl ScenarioOrchestrator {
    pub fn new(sessions: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self {
            sessions,
            scenarios: HashMap::new(),
            default_kind: ScenarioKind::default(),
            timeout,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a scenario under its own kind, replacing any previous one.
    pub fn register(&mut self, scenario: Arc<dyn Scenario>) {
        let kind = scenario.kind();
        if self.scenarios.insert(kind, scenario).is_some() {
            debug!(%kind, "Scenario replaced");
        }
    }

    /// Scenario for users who have no session yet.
    pub fn with_default(mut self, kind: ScenarioKind) -> Self {
        self.default_kind = kind;
        self
    }

    #[cfg(test)]
    fn is_registered(&self, kind: ScenarioKind) -> bool {
        self.scenarios.contains_key(&kind)
    }

    /// Handle one message and return the reply.
    pub async fn handle(
        &self,
        user_id: &str,
        message: &str,
        photo_ref: &str,
    ) -> Result<String, ScenarioError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            tokio::time::timeout(self.timeout, self.dispatch(user_id, message, photo_ref))
                .await
                .unwrap_or(Err(ScenarioError::Timeout(self.timeout)))
        };
        self.release_user_lock(user_id, &lock);
        result
    }

    fn user_lock(&self, user_id: &str) -> UserLock {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drop the map entry once nobody else holds or waits on it.
    fn release_user_lock(&self, user_id: &str, lock: &UserLock) {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one held by the caller.
        if Arc::strong_count(lock) == 2 {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.user_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn scenario(&self, kind: ScenarioKind) -> Result<&Arc<dyn Scenario>, ScenarioError> {
        self.scenarios
            .get(&kind)
            .ok_or_else(|| ScenarioError::UnknownScenario(kind.to_string()))
    }

    async fn dispatch(
        &self,
        user_id: &str,
        message: &str,
        photo_ref: &str,
    ) -> Result<String, ScenarioError> {
        if let Some(command) = Command::parse(message) {
            return self.run_command(user_id, command).await;
        }

        let session = self.sessions.get(user_id).await.map_err(storage_failure)?;
        let kind = session.map_or(self.default_kind, |s| s.current_scenario);
        debug!(user_id, scenario = %kind, "Dispatching message");
        self.scenario(kind)?.handle(user_id, message, photo_ref).await
    }

    async fn run_command(&self, user_id: &str, command: Command) -> Result<String, ScenarioError> {
        info!(user_id, ?command, "Command received");
        match command {
            Command::Start => {
                let session = self.sessions.create(user_id).await.map_err(storage_failure)?;
                Ok(StepTable::prompt(session.current_step).to_string())
            }
            Command::Meal => {
                self.scenario(ScenarioKind::MealCapture)?;
                let mut session = match self.sessions.get(user_id).await.map_err(storage_failure)? {
                    Some(session) => session,
                    None => self.sessions.create(user_id).await.map_err(storage_failure)?,
                };
                session.current_scenario = ScenarioKind::MealCapture;
                self.sessions
                    .update(user_id, &session)
                    .await
                    .map_err(storage_failure)?;
                Ok(MEAL_HINT.to_string())
            }
            Command::Stats => self.scenario(ScenarioKind::Stats)?.handle(user_id, "", "").await,
            Command::Cancel => {
                self.sessions.delete(user_id).await.map_err(storage_failure)?;
                Ok(SESSION_RESET.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::session::{InMemorySessionStore, UserSession};
    use crate::store::testing::FailingSessionStore;

    /// Replies with its own kind and the message it saw.
    struct Echo(ScenarioKind);

    #[async_trait]
    impl Scenario for Echo {
        fn kind(&self) -> ScenarioKind {
            self.0
        }

        async fn handle(&self, _: &str, message: &str, _: &str) -> Result<String, ScenarioError> {
            Ok(format!("{}:{message}", self.0))
        }
    }

    fn orchestrator() -> (ScenarioOrchestrator, Arc<InMemorySessionStore>) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let mut o = ScenarioOrchestrator::new(sessions.clone(), Duration::from_secs(5));
        o.register(Arc::new(Echo(ScenarioKind::Registration)));
        o.register(Arc::new(Echo(ScenarioKind::MealCapture)));
        o.register(Arc::new(Echo(ScenarioKind::Stats)));
        (o, sessions)
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /Register "), Some(Command::Start));
        assert_eq!(Command::parse("/meal@nutri_bot"), Some(Command::Meal));
        assert_eq!(Command::parse("/stats please"), Some(Command::Stats));
        assert_eq!(Command::parse("/cancel"), Some(Command::Cancel));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("start"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn new_user_goes_to_default() {
        let (o, _) = orchestrator();
        assert_eq!(o.handle("1", "hi", "").await.unwrap(), "registration:hi");

        let o = o.with_default(ScenarioKind::MealCapture);
        assert_eq!(o.handle("2", "hi", "").await.unwrap(), "meal_capture:hi");
    }

    #[tokio::test]
    async fn routes_by_session() {
        let (o, sessions) = orchestrator();
        sessions.create("1").await.unwrap();
        sessions.create("2").await.unwrap();

        assert_eq!(o.handle("2", "/meal", "").await.unwrap(), MEAL_HINT);
        assert_eq!(o.handle("1", "x", "").await.unwrap(), "registration:x");
        assert_eq!(o.handle("2", "x", "").await.unwrap(), "meal_capture:x");
    }

    #[tokio::test]
    async fn meal_command_keeps_registration_progress() {
        let (o, sessions) = orchestrator();
        let mut session = sessions.create("1").await.unwrap();
        session.current_step = crate::scenarios::steps::RegistrationStep::Height;
        sessions.update("1", &session).await.unwrap();

        o.handle("1", "/meal", "").await.unwrap();
        let session = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(session.current_scenario, ScenarioKind::MealCapture);
        assert_eq!(
            session.current_step,
            crate::scenarios::steps::RegistrationStep::Height
        );
    }

    #[tokio::test]
    async fn start_resets_session() {
        let (o, sessions) = orchestrator();
        o.handle("1", "/meal", "").await.unwrap();

        let reply = o.handle("1", "/start", "").await.unwrap();
        assert_eq!(reply, "What is your name?");
        let session = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(session, crate::session::UserSession::new("1"));
    }

    #[tokio::test]
    async fn stats_does_not_switch() {
        let (o, sessions) = orchestrator();
        sessions.create("1").await.unwrap();

        assert_eq!(o.handle("1", "/stats", "").await.unwrap(), "stats:");
        let session = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(session.current_scenario, ScenarioKind::Registration);
    }

    #[tokio::test]
    async fn cancel_deletes_session() {
        let (o, sessions) = orchestrator();
        sessions.create("1").await.unwrap();

        assert_eq!(o.handle("1", "/cancel", "").await.unwrap(), SESSION_RESET);
        assert!(sessions.get("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_command_is_plain_text() {
        let (o, _) = orchestrator();
        assert_eq!(
            o.handle("1", "/help", "").await.unwrap(),
            "registration:/help"
        );
    }

    #[tokio::test]
    async fn unregistered_scenario() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let o = ScenarioOrchestrator::new(sessions, Duration::from_secs(5));
        assert!(!o.is_registered(ScenarioKind::Registration));

        let err = o.handle("1", "hi", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownScenario(ref k) if k == "registration"));
        let err = o.handle("1", "/meal", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownScenario(ref k) if k == "meal_capture"));
    }

    struct Slow;

    #[async_trait]
    impl Scenario for Slow {
        fn kind(&self) -> ScenarioKind {
            ScenarioKind::Registration
        }

        async fn handle(&self, _: &str, _: &str, _: &str) -> Result<String, ScenarioError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    #[tokio::test]
    async fn dispatch_times_out() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let mut o = ScenarioOrchestrator::new(sessions, Duration::from_millis(50));
        o.register(Arc::new(Slow));

        let err = o.handle("1", "hi", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Timeout(d) if d == Duration::from_millis(50)));
        assert_eq!(o.tracked_users(), 0);
    }

    /// Tracks the highest number of overlapping calls.
    #[derive(Default)]
    struct Overlap {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Scenario for Overlap {
        fn kind(&self) -> ScenarioKind {
            ScenarioKind::Registration
        }

        async fn handle(&self, _: &str, _: &str, _: &str) -> Result<String, ScenarioError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_user_is_serialized() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let overlap = Arc::new(Overlap::default());
        let mut o = ScenarioOrchestrator::new(sessions, Duration::from_secs(5));
        o.register(overlap.clone());
        let o = Arc::new(o);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let o = o.clone();
                tokio::spawn(async move { o.handle("1", &format!("m{i}"), "").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
        assert_eq!(o.tracked_users(), 0);
    }

    /// Completes only once two calls are inside it at the same time.
    struct Rendezvous(tokio::sync::Barrier);

    #[async_trait]
    impl Scenario for Rendezvous {
        fn kind(&self) -> ScenarioKind {
            ScenarioKind::Registration
        }

        async fn handle(&self, _: &str, _: &str, _: &str) -> Result<String, ScenarioError> {
            self.0.wait().await;
            Ok("met".into())
        }
    }

    #[tokio::test]
    async fn different_users_run_concurrently() {
        let sessions = Arc::new(InMemorySessionStore::new());
        let mut o = ScenarioOrchestrator::new(sessions, Duration::from_secs(5));
        o.register(Arc::new(Rendezvous(tokio::sync::Barrier::new(2))));

        let (a, b) = tokio::join!(o.handle("1", "a", ""), o.handle("2", "b", ""));
        assert_eq!(a.unwrap(), "met");
        assert_eq!(b.unwrap(), "met");
    }

    #[tokio::test]
    async fn session_lookup_failure_gets_generic_reply() {
        let mut o = ScenarioOrchestrator::new(
            Arc::new(FailingSessionStore::offline()),
            Duration::from_secs(5),
        );
        o.register(Arc::new(Echo(ScenarioKind::Registration)));

        let err = o.handle("1", "hi", "").await.unwrap_err();
        assert!(matches!(err, ScenarioError::Storage { .. }));
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));
        assert_eq!(o.tracked_users(), 0);
    }

    #[tokio::test]
    async fn meal_command_write_failure_keeps_scenario() {
        let sessions = Arc::new(FailingSessionStore::read_only([UserSession::new("1")]).await);
        let mut o = ScenarioOrchestrator::new(sessions.clone(), Duration::from_secs(5));
        o.register(Arc::new(Echo(ScenarioKind::Registration)));
        o.register(Arc::new(Echo(ScenarioKind::MealCapture)));

        let err = o.handle("1", "/meal", "").await.unwrap_err();
        assert_eq!(err.reply(), Some(GENERIC_FAILURE));

        let stored = sessions.get("1").await.unwrap().unwrap();
        assert_eq!(stored.current_scenario, ScenarioKind::Registration);
        assert_eq!(o.handle("1", "x", "").await.unwrap(), "registration:x");
    }
}
