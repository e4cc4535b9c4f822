mod display;
mod format;
mod project;

pub use display::{
    Controls, DisplayModel, FeedView, Indicator, MarketView, MetricView, PerformanceView,
    PositionRow, QuoteView, RiskView, StatusBadge, Tone, Trend,
};
pub use format::{
    format_backend_time, format_clock, format_countdown, format_currency, format_percentage,
    format_price, format_quantity, PLACEHOLDER,
};
pub use project::{project, ProjectionInput};
