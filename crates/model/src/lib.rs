mod connection;
mod quote;
mod run_state;
mod snapshot;

pub use connection::ConnectionState;
pub use quote::{mid_price, Quote, QuoteDirection};
pub use run_state::{CommandKind, ControlCommand, InvalidRiskPerTrade, RunState};
pub use snapshot::{
    BackendStatus, Countdown, MarketHours, Performance, Position, PositionTotals, ReportedState,
    RiskReading, StatusSnapshot,
};

/// Quote freshness window: a connected stream is "live" only if a quote
/// arrived within this many milliseconds.
pub const FRESHNESS_WINDOW_MS: u64 = 10_000;
