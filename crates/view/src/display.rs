use model::{CommandKind, ConnectionState, QuoteDirection, RunState};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Unknown,
}

impl Trend {
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            Self::Up
        } else if value < 0.0 {
            Self::Down
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Green,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayModel {
    pub status: StatusBadge,
    pub controls: Controls,
    pub banner: Option<String>,
    pub last_update: String,
    pub performance: PerformanceView,
    pub risk: RiskView,
    pub market: MarketView,
    pub positions: Vec<PositionRow>,
    pub feed: FeedView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBadge {
    pub run_state: RunState,
    pub label: &'static str,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub available: Vec<CommandKind>,
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    pub value: String,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceView {
    pub total_pnl: MetricView,
    pub daily_pnl: MetricView,
    pub unrealized_pnl: MetricView,
    pub total_trades: String,
    pub win_rate: String,
    pub active_positions: String,
    pub market_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskView {
    pub level: String,
    pub score: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketView {
    pub label: &'static str,
    pub countdown: String,
    pub is_open: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub symbol: String,
    pub side: &'static str,
    pub quantity: String,
    pub entry_price: String,
    pub current_price: String,
    pub market_value: String,
    pub unrealized_pnl: MetricView,
    pub pnl_percentage: String,
    pub strategy: String,
    pub entry_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedView {
    pub connection: ConnectionState,
    pub live: bool,
    pub indicator: Indicator,
    pub message: Option<String>,
    pub placeholder: Option<&'static str>,
    pub quote: Option<QuoteView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteView {
    pub symbol: String,
    pub bid: String,
    pub ask: String,
    pub mid: String,
    pub direction: QuoteDirection,
    pub arrow: Option<&'static str>,
    pub time: String,
}
