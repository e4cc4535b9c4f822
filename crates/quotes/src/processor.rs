use std::collections::HashMap;

use model::{Quote, QuoteDirection};
use serde::Serialize;

use crate::extract::{extract_quote, RawQuote};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedQuote {
    pub quote: Quote,
    pub mid_price: Option<f64>,
    pub direction: QuoteDirection,
}

/// Derives per-symbol price direction from consecutive mid-prices.
///
/// The cache holds the latest mid per symbol for the whole session; symbol
/// cardinality is bounded by the active strategies.
#[derive(Debug, Default, Clone)]
pub struct QuoteProcessor {
    last_mid: HashMap<String, Option<f64>>,
}

impl QuoteProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, raw: &RawQuote) -> ProcessedQuote {
        self.process_quote(extract_quote(raw))
    }

    /// Direction is measured against the previous tick of the same symbol
    /// only. A tick without a mid still replaces the cached one.
    pub fn process_quote(&mut self, quote: Quote) -> ProcessedQuote {
        let mid_price = quote.mid_price();
        let previous = self.last_mid.insert(quote.symbol.clone(), mid_price).flatten();

        ProcessedQuote {
            direction: QuoteDirection::between(previous, mid_price),
            mid_price,
            quote,
        }
    }

    pub fn reset(&mut self) {
        self.last_mid.clear();
    }

    pub fn tracked_symbols(&self) -> usize {
        self.last_mid.len()
    }
}
