//! Error types for nutri-bot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors, shared by the session and record stores.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation not implemented: {0}")]
    NotImplemented(String),
}

/// Transport channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Image-analysis collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Vision request failed: {0}")]
    RequestFailed(String),

    #[error("Vision API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid vision response: {0}")]
    InvalidResponse(String),
}

/// Errors produced while a scenario handles a message.
///
/// Some variants carry the text the user should see alongside the error;
/// see [`ScenarioError::reply`].
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Invalid {field}: {reason}")]
    Validation {
        field: String,
        reason: String,
        reply: String,
    },

    #[error("Storage failure: {source}")]
    Storage {
        #[source]
        source: DatabaseError,
        reply: String,
    },

    #[error("Collaborator {name} failed: {source}")]
    Collaborator {
        name: String,
        #[source]
        source: VisionError,
    },

    #[error("No scenario registered for {0}")]
    UnknownScenario(String),

    #[error("Message handling timed out after {0:?}")]
    Timeout(Duration),
}

impl ScenarioError {
    /// The user-visible reply that accompanies this error, if the scenario
    /// produced one.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Validation { reply, .. } | Self::Storage { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// Whether the failure came from user input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_exposes_reply() {
        let err = ScenarioError::Validation {
            field: "age".into(),
            reason: "not a number".into(),
            reply: "You entered an invalid age".into(),
        };
        assert_eq!(err.reply(), Some("You entered an invalid age"));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Invalid age: not a number");
    }

    #[test]
    fn collaborator_error_has_no_reply() {
        let err = ScenarioError::Collaborator {
            name: "vision".into(),
            source: VisionError::RequestFailed("connection refused".into()),
        };
        assert!(err.reply().is_none());
        assert!(!err.is_validation());
    }

    #[test]
    fn storage_error_wraps_database_error() {
        let err = ScenarioError::Storage {
            source: DatabaseError::Query("disk full".into()),
            reply: "Something went wrong".into(),
        };
        assert_eq!(err.reply(), Some("Something went wrong"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn top_level_from_conversions() {
        let err: Error = ConfigError::MissingEnvVar("OPENAI_API_KEY".into()).into();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        let err: Error = DatabaseError::Migration("v2".into()).into();
        assert!(matches!(err, Error::Database(_)));
    }
}
