use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle phase of the trading system as known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Pausing,
    Paused,
    Stopping,
    Offline,
}

impl RunState {
    pub const ALL: [RunState; 7] = [
        Self::Stopped,
        Self::Starting,
        Self::Running,
        Self::Pausing,
        Self::Paused,
        Self::Stopping,
        Self::Offline,
    ];

    /// Whether a command of `kind` may be issued from this state.
    ///
    /// Stop is also accepted while offline: a backend that stopped answering
    /// polls may still be running and must stay stoppable.
    pub fn permits(self, kind: CommandKind) -> bool {
        matches!(
            (kind, self),
            (CommandKind::Start, Self::Stopped)
                | (CommandKind::Pause, Self::Running)
                | (CommandKind::Resume, Self::Paused)
                | (
                    CommandKind::Stop,
                    Self::Running | Self::Paused | Self::Offline
                )
        )
    }

    /// State shown while a command of `kind` is in flight.
    pub fn transitional_for(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Start | CommandKind::Resume => Self::Starting,
            CommandKind::Pause => Self::Pausing,
            CommandKind::Stop => Self::Stopping,
        }
    }

    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Starting | Self::Pausing | Self::Stopping)
    }

    pub fn available_commands(self) -> Vec<CommandKind> {
        CommandKind::ALL
            .into_iter()
            .filter(|kind| self.permits(*kind))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    Pause,
    Resume,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [Self::Start, Self::Pause, Self::Resume, Self::Stop];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Start { risk_per_trade: f64 },
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("risk per trade must be a finite positive amount, got {0}")]
pub struct InvalidRiskPerTrade(pub f64);

impl ControlCommand {
    pub fn start(risk_per_trade: f64) -> Result<Self, InvalidRiskPerTrade> {
        if !risk_per_trade.is_finite() || risk_per_trade <= 0.0 {
            return Err(InvalidRiskPerTrade(risk_per_trade));
        }

        Ok(Self::Start { risk_per_trade })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start { .. } => CommandKind::Start,
            Self::Stop => CommandKind::Stop,
            Self::Pause => CommandKind::Pause,
            Self::Resume => CommandKind::Resume,
        }
    }
}
