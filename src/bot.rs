//! Main message loop: channels in, orchestrator, replies out.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::error::{Error, ScenarioError};
use crate::scenarios::{GENERIC_FAILURE, ScenarioOrchestrator};

pub struct Bot {
    orchestrator: Arc<ScenarioOrchestrator>,
    channels: Arc<ChannelManager>,
}

impl Bot {
    pub fn new(orchestrator: ScenarioOrchestrator, channels: ChannelManager) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            channels: Arc::new(channels),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends. Each message is
    /// handled on its own task; in-flight messages finish before returning.
    pub async fn run(self) -> Result<(), Error> {
        let mut message_stream = self.channels.start_all().await?;
        let mut in_flight = JoinSet::new();

        tracing::info!(channels = ?self.channels.names(), "Bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("All channel streams ended, shutting down...");
                        break;
                    }
                },
                // Reap finished tasks so the set does not grow unbounded
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let channels = Arc::clone(&self.channels);
            in_flight.spawn(async move {
                let reply = handle_message(&orchestrator, &message).await;
                if reply.is_empty() {
                    return;
                }
                if let Err(e) = channels
                    .respond(&message, OutgoingResponse::text(reply))
                    .await
                {
                    tracing::error!(user_id = %message.user_id, channel = %message.channel, "Failed to send reply: {e}");
                }
            });
        }

        while in_flight.join_next().await.is_some() {}
        self.channels.shutdown_all().await?;
        Ok(())
    }
}

/// Run one message through the orchestrator and pick the text to send back.
pub async fn handle_message(orchestrator: &ScenarioOrchestrator, msg: &IncomingMessage) -> String {
    tracing::debug!(
        user_id = %msg.user_id,
        channel = %msg.channel,
        photo = msg.has_photo(),
        "Received message"
    );
    reply_for(
        &msg.user_id,
        orchestrator
            .handle(&msg.user_id, &msg.text, &msg.photo_ref)
            .await,
    )
}

/// Errors become the reply they carry, or a generic failure text.
fn reply_for(user_id: &str, result: Result<String, ScenarioError>) -> String {
    match result {
        Ok(reply) => reply,
        Err(e) if e.is_validation() => {
            tracing::debug!(user_id, "Rejected input: {e}");
            e.reply().unwrap_or(GENERIC_FAILURE).to_string()
        }
        Err(e) => {
            tracing::error!(user_id, "Error handling message: {e}");
            e.reply().unwrap_or(GENERIC_FAILURE).to_string()
        }
    }
}
