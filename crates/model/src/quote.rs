use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Latest top-of-book for one symbol. Prices are optional because the feed
/// may omit either side; zero is a real price and is kept as such.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

impl Quote {
    pub fn mid_price(&self) -> Option<f64> {
        mid_price(self.bid_price, self.ask_price)
    }
}

pub fn mid_price(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(bid), Some(ask)) if bid.is_finite() && ask.is_finite() => Some((bid + ask) / 2.0),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteDirection {
    Up,
    Down,
    Same,
    Unknown,
}

impl QuoteDirection {
    pub fn between(previous_mid: Option<f64>, current_mid: Option<f64>) -> Self {
        let (Some(previous), Some(current)) = (previous_mid, current_mid) else {
            return Self::Unknown;
        };

        if current > previous {
            Self::Up
        } else if current < previous {
            Self::Down
        } else {
            Self::Same
        }
    }
}
