use model::Quote;
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub type RawQuote = Map<String, Value>;

const UNKNOWN_SYMBOL: &str = "?";

/// Pulls a quote out of either accepted wire shape: short keys
/// (`S`/`bp`/`ap`/`t`) or long keys (`symbol`/`bid_price`/`ask_price`/`timestamp`).
///
/// Missing or mistyped fields come back as `None` rather than an error.
pub fn extract_quote(raw: &RawQuote) -> Quote {
    let symbol = first_present(raw, &["symbol", "S"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .unwrap_or(UNKNOWN_SYMBOL)
        .to_string();

    Quote {
        symbol,
        bid_price: price_field(raw, &["bp", "bid_price"]),
        ask_price: price_field(raw, &["ap", "ask_price"]),
        timestamp: first_present(raw, &["timestamp", "t"]).and_then(parse_timestamp),
    }
}

fn first_present<'a>(raw: &'a RawQuote, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn price_field(raw: &RawQuote, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(as_price)
}

fn as_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    price.is_finite().then_some(price)
}

fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(text) => OffsetDateTime::parse(text, &Rfc3339).ok(),
        Value::Number(number) => {
            let millis = number.as_i64()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        _ => None,
    }
}
