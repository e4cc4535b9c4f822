use model::{CommandKind, ControlCommand, ReportedState, RunState, StatusSnapshot};
use thiserror::Error;

use crate::{commands::CommandOutcome, poller::PollFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("cannot {command} while {state}")]
    NotPermitted {
        command: CommandKind,
        state: RunState,
    },
    #[error("cannot {command} while {in_flight} is in flight")]
    Busy {
        command: CommandKind,
        in_flight: CommandKind,
    },
}

/// User-visible error banner.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Alert {
    message: String,
    /// Snapshots up to and including this sequence number leave it in place.
    held_through: Option<u64>,
}

/// Single authority over the run state.
///
/// Commands move it to a transitional state the moment they are accepted;
/// from then on only the backend, through the next snapshot after the
/// command settles, decides where it lands.
#[derive(Debug, Clone)]
pub struct ControlStateMachine {
    run_state: RunState,
    in_flight: Option<CommandKind>,
    awaiting_confirmation: bool,
    alert: Option<Alert>,
}

impl Default for ControlStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlStateMachine {
    /// Nothing is known about the backend until the first poll lands.
    pub fn new() -> Self {
        Self {
            run_state: RunState::Offline,
            in_flight: None,
            awaiting_confirmation: false,
            alert: None,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn in_flight(&self) -> Option<CommandKind> {
        self.in_flight
    }

    /// True from acceptance of a command until the snapshot that confirms it.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.awaiting_confirmation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.alert.as_ref().map(|alert| alert.message.as_str())
    }

    /// Accepts `command` or rejects it without touching any state.
    pub fn begin(&mut self, command: &ControlCommand) -> Result<(), Rejection> {
        let kind = command.kind();
        if let Some(in_flight) = self.in_flight {
            return Err(Rejection::Busy {
                command: kind,
                in_flight,
            });
        }
        if !self.run_state.permits(kind) {
            return Err(Rejection::NotPermitted {
                command: kind,
                state: self.run_state,
            });
        }

        self.in_flight = Some(kind);
        self.awaiting_confirmation = false;
        self.run_state = RunState::transitional_for(kind);
        Ok(())
    }

    /// Records how the in-flight command ended.
    ///
    /// `confirming_seq` is the poll cycle issued right after the outcome; an
    /// error raised here survives that cycle and clears on a later one.
    pub fn complete(&mut self, outcome: &CommandOutcome, confirming_seq: u64) {
        let Some(kind) = self.in_flight.take() else {
            return;
        };
        self.awaiting_confirmation = true;

        match outcome {
            CommandOutcome::Completed(_) => self.alert = None,
            CommandOutcome::Degraded(reason) => self.hold_alert(reason.clone(), confirming_seq),
            CommandOutcome::TransientFailure(err) => {
                self.hold_alert(format!("Failed to {kind} live trading: {err}"), confirming_seq)
            }
            CommandOutcome::Failed(err) => {
                self.run_state = RunState::Offline;
                self.hold_alert(format!("Failed to {kind} live trading: {err}"), confirming_seq);
            }
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &StatusSnapshot, seq: u64) {
        if let Some(kind) = self.in_flight {
            // Only a failed poll can have moved us off the transitional state.
            if self.run_state == RunState::Offline {
                self.run_state = RunState::transitional_for(kind);
            }
            return;
        }

        self.run_state = snapshot.run_state();
        self.awaiting_confirmation = false;

        let held = self
            .alert
            .as_ref()
            .and_then(|alert| alert.held_through)
            .is_some_and(|through| seq <= through);
        if !held {
            self.alert = None;
        }

        if snapshot.status.reported == ReportedState::Error {
            let detail = snapshot
                .status
                .error_message
                .as_deref()
                .unwrap_or("unknown error");
            self.alert = Some(Alert {
                message: format!("Trading system error: {detail}"),
                held_through: None,
            });
        }
    }

    pub fn apply_poll_failure(&mut self, failure: &PollFailure) {
        self.run_state = RunState::Offline;
        self.awaiting_confirmation = false;
        self.alert = Some(Alert {
            message: failure.to_string(),
            held_through: None,
        });
    }

    fn hold_alert(&mut self, message: String, through: u64) {
        self.alert = Some(Alert {
            message,
            held_through: Some(through),
        });
    }
}
