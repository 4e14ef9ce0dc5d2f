//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::vision::VisionConfig;

pub const DEFAULT_PROMPT: &str = "Identify the food in this photo. Reply with a short \
     description and an estimate of calories, proteins, fats and carbohydrates.";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DB_PATH: &str = "./data/nutri-bot.db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where sessions and records are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    LibSql { path: PathBuf },
}

/// Telegram transport settings. Absent when no bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: Option<TelegramConfig>,
    pub vision: VisionConfig,
    pub storage: StorageBackend,
    /// Upper bound on handling one message.
    pub handle_timeout: Duration,
    /// Directory for daily log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let handle_timeout = match get("NUTRI_BOT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "NUTRI_BOT_TIMEOUT_SECS".into(),
                        message: format!("expected a positive number of seconds, got {raw:?}"),
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let storage = match get("NUTRI_BOT_STORAGE").as_deref().map(str::trim) {
            None | Some("memory") => StorageBackend::Memory,
            Some("libsql") => StorageBackend::LibSql {
                path: get("NUTRI_BOT_DB_PATH")
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                    .into(),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "NUTRI_BOT_STORAGE".into(),
                    message: format!("expected \"memory\" or \"libsql\", got {other:?}"),
                });
            }
        };

        let telegram = get("TELEGRAM_BOT_TOKEN").map(|token| TelegramConfig {
            bot_token: SecretString::from(token),
            allowed_users: parse_allowed_users(
                get("TELEGRAM_ALLOWED_USERS").as_deref().unwrap_or("*"),
            ),
        });

        let vision = VisionConfig {
            api_key: SecretString::from(api_key),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt: get("OPENAI_PROMPT").unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            timeout: handle_timeout,
        };

        Ok(Self {
            telegram,
            vision,
            storage,
            handle_timeout,
            log_dir: get("NUTRI_BOT_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_allowed_users(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
