use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use nutri_bot::bot::Bot;
use nutri_bot::channels::{Channel, ChannelManager, CliChannel, TelegramChannel, TelegramFiles};
use nutri_bot::config::{AppConfig, StorageBackend};
use nutri_bot::error::{Error, Result};
use nutri_bot::scenarios::{
    MealCaptureScenario, RegistrationScenario, ScenarioOrchestrator, StatsScenario,
};
use nutri_bot::session::{InMemorySessionStore, SessionStore};
use nutri_bot::store::{InMemoryRecordStore, LibSqlBackend, RecordStore};
use nutri_bot::vision::{OpenAiVision, VisionConfig};

/// Install the subscriber. The returned guard flushes the log file on drop.
fn init_tracing(config: &AppConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nutri-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

/// Open the configured session and record stores.
async fn open_storage(
    storage: &StorageBackend,
) -> Result<(Arc<dyn SessionStore>, Arc<dyn RecordStore>)> {
    match storage {
        StorageBackend::Memory => {
            eprintln!("   Storage: in-memory");
            Ok((
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryRecordStore::new()),
            ))
        }
        StorageBackend::LibSql { path } => {
            let backend = Arc::new(LibSqlBackend::new_local(path).await?);
            eprintln!("   Storage: {}", path.display());
            let sessions: Arc<dyn SessionStore> = backend.clone();
            Ok((sessions, backend))
        }
    }
}

/// Build the vision client, teaching it to download Telegram photos.
fn build_vision(config: &VisionConfig, files: Option<TelegramFiles>) -> Result<OpenAiVision> {
    let vision = OpenAiVision::new(config.clone())?;
    Ok(match files {
        Some(files) => vision.with_source(Arc::new(files)),
        None => vision,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", Error::from(e));
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });
    let _log_guard = init_tracing(&config);

    eprintln!("🥗 Nutri Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.vision.model);

    // ── Storage ──────────────────────────────────────────────────────────
    let (sessions, records) = open_storage(&config.storage)
        .await
        .context("failed to open storage")?;

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut telegram_files = None;
    match &config.telegram {
        Some(telegram) => {
            let channel = TelegramChannel::new(
                telegram.bot_token.clone(),
                telegram.allowed_users.clone(),
            )?;
            channel
                .health_check()
                .await
                .context("Telegram bot token rejected")?;
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if telegram.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    telegram.allowed_users.join(", ")
                }
            );
            telegram_files = Some(channel.files());
            channels.add(Box::new(channel));
        }
        None => {
            eprintln!("   Type a message and press Enter. /photo <url> [comment] attaches a photo.");
            channels.add(Box::new(CliChannel::new()));
        }
    }
    eprintln!("   Channels: {}\n", channels.names().join(", "));

    // ── Scenarios ────────────────────────────────────────────────────────
    let vision = Arc::new(build_vision(&config.vision, telegram_files)?);

    let mut orchestrator = ScenarioOrchestrator::new(Arc::clone(&sessions), config.handle_timeout);
    orchestrator.register(Arc::new(RegistrationScenario::new(
        Arc::clone(&sessions),
        Arc::clone(&records),
    )));
    orchestrator.register(Arc::new(MealCaptureScenario::new(
        Arc::clone(&records),
        vision,
    )));
    orchestrator.register(Arc::new(StatsScenario::new(records)));

    Bot::new(orchestrator, channels).run().await?;
    Ok(())
}
