use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::RunState;

/// Run state as the backend reports it on its status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedState {
    Stopped,
    Running,
    Paused,
    Error,
}

impl ReportedState {
    /// A backend in `error` is reachable but not trading, so it reads as stopped.
    pub fn run_state(self) -> RunState {
        match self {
            Self::Stopped | Self::Error => RunState::Stopped,
            Self::Running => RunState::Running,
            Self::Paused => RunState::Paused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    #[serde(rename = "status")]
    pub reported: ReportedState,
    #[serde(default)]
    pub active_strategies: Vec<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub paper_trading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub pnl_percentage: f64,
    #[serde(default)]
    pub strategy_id: Option<String>,
    pub strategy_name: String,
    pub entry_time: String,
}

impl Position {
    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub total_trades: u64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionTotals {
    pub total_positions: u64,
    pub total_market_value: f64,
    pub total_unrealized_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReading {
    pub level: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHours {
    pub is_open: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub time_until_open: Option<Countdown>,
    #[serde(default)]
    pub time_until_close: Option<Countdown>,
    #[serde(default)]
    pub next_open: Option<String>,
    #[serde(default)]
    pub next_close: Option<String>,
}

/// One atomically published bundle of polled backend state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: BackendStatus,
    pub positions: Vec<Position>,
    pub performance: Performance,
    pub position_totals: PositionTotals,
    pub risk: RiskReading,
    pub market_hours: MarketHours,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

impl StatusSnapshot {
    pub fn run_state(&self) -> RunState {
        self.status.reported.run_state()
    }
}
