//! Session persistence: which scenario and step each user is in.

pub mod memory;
pub mod model;
pub mod store;

pub use memory::InMemorySessionStore;
pub use model::{RegistrationTarget, UserSession};
pub use store::SessionStore;
