use std::time::Duration;

use async_trait::async_trait;
use model::{CommandKind, ControlCommand};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Body of a successful control request.
///
/// A `warning` on a stop acknowledgment means the backend accepted the
/// request but has not finished winding down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Network error: Unable to connect to server ({0})")]
    Network(String),
    #[error("{reason}")]
    Rejected { status: u16, reason: String },
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl CommandError {
    pub fn http(status: u16, detail: Option<String>) -> Self {
        Self::Rejected {
            status,
            reason: detail.unwrap_or_else(|| format!("Server error: {status}")),
        }
    }

    /// Timeouts and unreachable backends may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TimedOut(_) | Self::Network(_))
    }
}

#[async_trait]
pub trait ControlApi: Send + Sync + 'static {
    async fn send(&self, command: ControlCommand) -> Result<CommandAck, CommandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(CommandAck),
    /// Stop was not confirmed after its retry.
    Degraded(String),
    TransientFailure(CommandError),
    Failed(CommandError),
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSettings {
    pub timeout: Duration,
    pub stop_retry_delay: Duration,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            stop_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Sends `command` and classifies the result.
///
/// Stop gets one retry after `stop_retry_delay` when the first attempt times
/// out, cannot reach the backend, or comes back with a warning.
pub async fn execute<C: ControlApi + ?Sized>(
    api: &C,
    command: ControlCommand,
    settings: CommandSettings,
) -> CommandOutcome {
    let first = attempt(api, command, settings.timeout).await;
    if command.kind() != CommandKind::Stop {
        return match first {
            Ok(ack) => CommandOutcome::Completed(ack),
            Err(err) if err.is_transient() => CommandOutcome::TransientFailure(err),
            Err(err) => CommandOutcome::Failed(err),
        };
    }

    let reason = match first {
        Ok(ack) if ack.warning.is_none() => return CommandOutcome::Completed(ack),
        Ok(ack) => ack.warning.unwrap_or_default(),
        Err(err) if err.is_transient() => err.to_string(),
        Err(err) => return CommandOutcome::Failed(err),
    };

    warn!(%reason, delay = ?settings.stop_retry_delay, "stop not confirmed, retrying once");
    tokio::time::sleep(settings.stop_retry_delay).await;

    match attempt(api, command, settings.timeout).await {
        Ok(ack) if ack.warning.is_none() => CommandOutcome::Completed(ack),
        Ok(ack) => CommandOutcome::Degraded(format!(
            "Stop still in progress: {}",
            ack.warning.unwrap_or_default()
        )),
        Err(err) if err.is_transient() => {
            CommandOutcome::Degraded(format!("Stop could not be confirmed: {err}"))
        }
        Err(err) => CommandOutcome::Failed(err),
    }
}

async fn attempt<C: ControlApi + ?Sized>(
    api: &C,
    command: ControlCommand,
    limit: Duration,
) -> Result<CommandAck, CommandError> {
    match tokio::time::timeout(limit, api.send(command)).await {
        Ok(result) => result,
        Err(_) => Err(CommandError::TimedOut(limit)),
    }
}
