//! Nutri Bot: a conversational nutrition tracker.
//!
//! Incoming messages are routed by [`scenarios::ScenarioOrchestrator`] to the
//! scenario recorded in each user's session: registration, meal capture or
//! stats.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod scenarios;
pub mod session;
pub mod store;
pub mod vision;
