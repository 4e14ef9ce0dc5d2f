//! Persistence layer: record storage for profiles, history and meals.
//!
//! `LibSqlBackend` also implements [`crate::session::SessionStore`], so one
//! database file holds both sessions and records.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod model;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use libsql_backend::LibSqlBackend;
pub use memory::InMemoryRecordStore;
pub use model::{Meal, Profile, Record};
pub use traits::RecordStore;
