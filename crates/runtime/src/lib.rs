pub mod backend;
pub mod commands;
pub mod control;
pub mod desk;
pub mod logging;
pub mod metrics;
pub mod poller;
pub mod supervisor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use commands::{CommandAck, CommandError, CommandOutcome, ControlApi};
pub use control::{ControlStateMachine, Rejection};
pub use desk::{DeskHandle, DeskSettings, DeskState, IssueError, LiveDesk};
pub use metrics::{LatencyPercentiles, PollLatencyMetrics};
pub use poller::{Endpoint, PollFailure, ReadError, StatusPoller, StatusSource};
pub use supervisor::{ConnectionSupervisor, StreamEnvelope, StreamEvent, StreamHandle, StreamTransport};
