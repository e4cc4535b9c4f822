use model::{ConnectionState, Position, QuoteDirection, RunState, StatusSnapshot};
use quotes::ProcessedQuote;

use crate::display::{
    Controls, DisplayModel, FeedView, Indicator, MarketView, MetricView, PerformanceView,
    PositionRow, QuoteView, RiskView, StatusBadge, Tone, Trend,
};
use crate::format::{
    format_backend_time, format_clock, format_countdown, format_currency, format_percentage,
    format_price, format_quantity, PLACEHOLDER,
};

/// Everything the projector reads. `Default` is the first-paint state:
/// nothing polled, nothing streamed.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionInput<'a> {
    pub run_state: RunState,
    pub busy: bool,
    pub snapshot: Option<&'a StatusSnapshot>,
    pub quote: Option<&'a ProcessedQuote>,
    pub connection: ConnectionState,
    pub fresh: bool,
    pub alert: Option<&'a str>,
    pub feed_error: Option<&'a str>,
}

impl Default for ProjectionInput<'_> {
    fn default() -> Self {
        Self {
            run_state: RunState::Offline,
            busy: false,
            snapshot: None,
            quote: None,
            connection: ConnectionState::Disconnected,
            fresh: false,
            alert: None,
            feed_error: None,
        }
    }
}

pub fn project(input: &ProjectionInput<'_>) -> DisplayModel {
    DisplayModel {
        status: status_badge(input.run_state),
        controls: Controls {
            available: if input.busy {
                Vec::new()
            } else {
                input.run_state.available_commands()
            },
            busy: input.busy,
        },
        banner: input.alert.map(str::to_string),
        last_update: format_clock(input.snapshot.map(|snapshot| snapshot.fetched_at)),
        performance: performance_view(input.snapshot),
        risk: risk_view(input.snapshot),
        market: market_view(input.snapshot),
        positions: input
            .snapshot
            .map(|snapshot| snapshot.positions.iter().map(position_row).collect())
            .unwrap_or_default(),
        feed: feed_view(input),
    }
}

fn status_badge(run_state: RunState) -> StatusBadge {
    let (label, tone) = match run_state {
        RunState::Running => ("System Online", Tone::Success),
        RunState::Paused => ("System Paused", Tone::Warning),
        RunState::Stopped => ("System Stopped", Tone::Error),
        RunState::Offline => ("System Offline", Tone::Error),
        RunState::Starting => ("Starting", Tone::Info),
        RunState::Pausing => ("Pausing", Tone::Info),
        RunState::Stopping => ("Stopping", Tone::Info),
    };

    StatusBadge {
        run_state,
        label,
        tone,
    }
}

fn money(value: Option<f64>) -> MetricView {
    match value {
        Some(value) => MetricView {
            value: format_currency(value),
            trend: Trend::of(value),
        },
        None => MetricView {
            value: PLACEHOLDER.to_string(),
            trend: Trend::Unknown,
        },
    }
}

fn performance_view(snapshot: Option<&StatusSnapshot>) -> PerformanceView {
    let performance = snapshot.map(|snapshot| snapshot.performance);
    let totals = snapshot.map(|snapshot| snapshot.position_totals);

    PerformanceView {
        total_pnl: money(performance.map(|p| p.total_pnl)),
        daily_pnl: money(performance.map(|p| p.daily_pnl)),
        unrealized_pnl: money(totals.map(|t| t.total_unrealized_pnl)),
        total_trades: performance
            .map(|p| p.total_trades.to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        win_rate: performance
            .map(|p| format_percentage(p.win_rate))
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        active_positions: snapshot
            .map(|snapshot| snapshot.positions.len().to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
        market_value: totals
            .map(|t| format_currency(t.total_market_value))
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    }
}

fn risk_view(snapshot: Option<&StatusSnapshot>) -> RiskView {
    let Some(risk) = snapshot.map(|snapshot| &snapshot.risk) else {
        return RiskView {
            level: PLACEHOLDER.to_string(),
            score: PLACEHOLDER.to_string(),
            tone: Tone::Info,
        };
    };

    let tone = match risk.level.trim().to_ascii_lowercase().as_str() {
        "low" => Tone::Success,
        "medium" | "moderate" => Tone::Warning,
        "high" | "critical" => Tone::Error,
        _ => Tone::Info,
    };
    let score = if risk.score.is_finite() {
        format!("{:.1}", risk.score)
    } else {
        PLACEHOLDER.to_string()
    };

    RiskView {
        level: risk.level.clone(),
        score,
        tone,
    }
}

fn market_view(snapshot: Option<&StatusSnapshot>) -> MarketView {
    let Some(market) = snapshot.map(|snapshot| &snapshot.market_hours) else {
        return MarketView {
            label: PLACEHOLDER,
            countdown: PLACEHOLDER.to_string(),
            is_open: None,
        };
    };

    let countdown = if market.is_open {
        market
            .time_until_close
            .map(|c| format!("closes in {}", format_countdown(c)))
    } else {
        market
            .time_until_open
            .map(|c| format!("opens in {}", format_countdown(c)))
    };

    MarketView {
        label: if market.is_open { "Open" } else { "Closed" },
        countdown: countdown.unwrap_or_else(|| PLACEHOLDER.to_string()),
        is_open: Some(market.is_open),
    }
}

fn position_row(position: &Position) -> PositionRow {
    PositionRow {
        symbol: position.symbol.clone(),
        side: if position.is_short() { "Short" } else { "Long" },
        quantity: format_quantity(position.quantity),
        entry_price: format_price(Some(position.entry_price)),
        current_price: format_price(Some(position.current_price)),
        market_value: format_currency(position.market_value),
        unrealized_pnl: money(Some(position.unrealized_pnl)),
        pnl_percentage: format_percentage(position.pnl_percentage),
        strategy: position.strategy_name.clone(),
        entry_time: format_backend_time(Some(&position.entry_time)),
    }
}

fn feed_view(input: &ProjectionInput<'_>) -> FeedView {
    let live = input.fresh && input.connection == ConnectionState::Connected;
    let placeholder = match input.quote {
        Some(_) => None,
        None if input.run_state == RunState::Running => Some("Waiting..."),
        None => Some("Not running"),
    };

    FeedView {
        connection: input.connection,
        live,
        indicator: if live { Indicator::Green } else { Indicator::Red },
        message: input.feed_error.map(str::to_string),
        placeholder,
        quote: input.quote.map(quote_view),
    }
}

fn quote_view(processed: &ProcessedQuote) -> QuoteView {
    let quote = &processed.quote;

    QuoteView {
        symbol: quote.symbol.clone(),
        bid: format_price(quote.bid_price),
        ask: format_price(quote.ask_price),
        mid: format_price(processed.mid_price),
        direction: processed.direction,
        arrow: match processed.direction {
            QuoteDirection::Up => Some("▲"),
            QuoteDirection::Down => Some("▼"),
            QuoteDirection::Same | QuoteDirection::Unknown => None,
        },
        time: format_clock(quote.timestamp),
    }
}

#[cfg(test)]
mod tests {
    use model::{
        BackendStatus, CommandKind, ConnectionState, Countdown, MarketHours, Performance,
        Position, PositionTotals, QuoteDirection, ReportedState, RiskReading, RunState,
        StatusSnapshot,
    };
    use quotes::QuoteProcessor;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::{project, ProjectionInput};
    use crate::display::{Indicator, Tone, Trend};

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            status: BackendStatus {
                reported: ReportedState::Running,
                active_strategies: vec!["pairs".to_string()],
                last_update: Some("2024-05-01T14:30:00".to_string()),
                error_message: None,
                paper_trading: true,
            },
            positions: vec![Position {
                symbol: "MSFT".to_string(),
                quantity: -12.0,
                entry_price: 410.0,
                current_price: 405.0,
                market_value: -4_860.0,
                unrealized_pnl: 60.0,
                pnl_percentage: 1.22,
                strategy_id: None,
                strategy_name: "pairs".to_string(),
                entry_time: "2024-05-01T14:30:00".to_string(),
            }],
            performance: Performance {
                total_pnl: 15_420.5,
                daily_pnl: -250.0,
                total_trades: 247,
                win_rate: 68.4,
            },
            position_totals: PositionTotals {
                total_positions: 1,
                total_market_value: -4_860.0,
                total_unrealized_pnl: 60.0,
            },
            risk: RiskReading {
                level: "Medium".to_string(),
                score: 42.26,
            },
            market_hours: MarketHours {
                is_open: true,
                reason: Some("market_open".to_string()),
                time_until_open: None,
                time_until_close: Some(Countdown {
                    days: 0,
                    hours: 2,
                    minutes: 15,
                }),
                next_open: None,
                next_close: None,
            },
            fetched_at: OffsetDateTime::from_unix_timestamp(1_714_573_805).unwrap(),
        }
    }

    #[test]
    fn first_paint_is_all_placeholders() {
        let model = project(&ProjectionInput::default());

        assert_eq!(model.status.label, "System Offline");
        assert_eq!(model.last_update, "-");
        assert_eq!(model.performance.total_pnl.value, "-");
        assert_eq!(model.performance.total_pnl.trend, Trend::Unknown);
        assert_eq!(model.risk.level, "-");
        assert_eq!(model.market.label, "-");
        assert!(model.positions.is_empty());
        assert_eq!(model.feed.placeholder, Some("Not running"));
        assert_eq!(model.feed.indicator, Indicator::Red);
        assert!(model.banner.is_none());
    }

    #[test]
    fn every_state_and_feed_combination_projects() {
        let snapshot = snapshot();
        let mut processor = QuoteProcessor::new();
        let quote = processor.process(json!({ "S": "AAPL" }).as_object().unwrap());
        let connections = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Lost,
        ];

        for run_state in RunState::ALL {
            for connection in connections {
                for fresh in [false, true] {
                    for with_data in [false, true] {
                        let input = ProjectionInput {
                            run_state,
                            busy: false,
                            snapshot: with_data.then_some(&snapshot),
                            quote: with_data.then_some(&quote),
                            connection,
                            fresh,
                            alert: None,
                            feed_error: None,
                        };
                        let model = project(&input);

                        assert_eq!(model.status.run_state, run_state);
                        assert_eq!(
                            model.feed.live,
                            fresh && connection == ConnectionState::Connected
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn snapshot_fields_are_formatted() {
        let snapshot = snapshot();
        let model = project(&ProjectionInput {
            run_state: RunState::Running,
            snapshot: Some(&snapshot),
            ..ProjectionInput::default()
        });

        assert_eq!(model.status.label, "System Online");
        assert_eq!(model.status.tone, Tone::Success);
        assert_eq!(model.last_update, "14:30:05");
        assert_eq!(model.performance.total_pnl.value, "$15,420.50");
        assert_eq!(model.performance.daily_pnl.trend, Trend::Down);
        assert_eq!(model.performance.win_rate, "68.40%");
        assert_eq!(model.performance.active_positions, "1");
        assert_eq!(model.risk.score, "42.3");
        assert_eq!(model.risk.tone, Tone::Warning);
        assert_eq!(model.market.label, "Open");
        assert_eq!(model.market.countdown, "closes in 2h 15m");

        let row = &model.positions[0];
        assert_eq!(row.side, "Short");
        assert_eq!(row.quantity, "12");
        assert_eq!(row.market_value, "-$4,860.00");
        assert_eq!(row.entry_time, "2024-05-01 14:30:00");
        assert_eq!(model.feed.placeholder, Some("Waiting..."));
    }

    #[test]
    fn busy_hides_controls() {
        let idle = project(&ProjectionInput {
            run_state: RunState::Running,
            ..ProjectionInput::default()
        });
        let busy = project(&ProjectionInput {
            run_state: RunState::Running,
            busy: true,
            ..ProjectionInput::default()
        });

        assert_eq!(
            idle.controls.available,
            vec![CommandKind::Pause, CommandKind::Stop]
        );
        assert!(busy.controls.available.is_empty());
    }

    #[test]
    fn falling_quote_renders_down_arrow_and_mid() {
        let mut processor = QuoteProcessor::new();
        processor.process(json!({ "S": "AAPL", "bp": 100.0, "ap": 101.0 }).as_object().unwrap());
        let quote =
            processor.process(json!({ "S": "AAPL", "bp": 99.0, "ap": 100.0 }).as_object().unwrap());

        let model = project(&ProjectionInput {
            run_state: RunState::Running,
            quote: Some(&quote),
            connection: ConnectionState::Connected,
            fresh: true,
            ..ProjectionInput::default()
        });

        let view = model.feed.quote.unwrap();
        assert_eq!(view.direction, QuoteDirection::Down);
        assert_eq!(view.arrow, Some("▼"));
        assert_eq!(view.mid, "99.50");
        assert_eq!(view.bid, "99.00");
        assert_eq!(model.feed.indicator, Indicator::Green);
        assert_eq!(model.feed.placeholder, None);
    }

    #[test]
    fn feed_error_and_alert_are_surfaced() {
        let model = project(&ProjectionInput {
            alert: Some("Server error: 500"),
            feed_error: Some("WebSocket connection lost"),
            connection: ConnectionState::Lost,
            ..ProjectionInput::default()
        });

        assert_eq!(model.banner.as_deref(), Some("Server error: 500"));
        assert_eq!(model.feed.message.as_deref(), Some("WebSocket connection lost"));
    }
}
