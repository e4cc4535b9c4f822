use model::Countdown;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub const PLACEHOLDER: &str = "-";

pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }

    let fixed = format!("{:.2}", value.abs());
    // Sign follows the rounded amount, so tiny losses show as $0.00.
    let rounds_to_zero = fixed.bytes().all(|b| matches!(b, b'0' | b'.'));
    let sign = if value < 0.0 && !rounds_to_zero { "-" } else { "" };
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    format!("{sign}${}.{cents}", group_thousands(whole))
}

pub fn format_percentage(value: f64) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    format!("{value:.2}%")
}

/// Absent prices render as the placeholder; zero is a price.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(price) if price.is_finite() => format!("{price:.2}"),
        _ => PLACEHOLDER.to_string(),
    }
}

pub fn format_quantity(quantity: f64) -> String {
    if !quantity.is_finite() {
        return PLACEHOLDER.to_string();
    }
    format!("{}", quantity.abs())
}

pub fn format_clock(timestamp: Option<OffsetDateTime>) -> String {
    match timestamp {
        Some(ts) => format!("{:02}:{:02}:{:02}", ts.hour(), ts.minute(), ts.second()),
        None => PLACEHOLDER.to_string(),
    }
}

/// Backend timestamps arrive either as RFC3339 or as a naive ISO string
/// without an offset; both render as `YYYY-MM-DD HH:MM:SS`.
pub fn format_backend_time(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return PLACEHOLDER.to_string();
    };

    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            ts.year(),
            u8::from(ts.month()),
            ts.day(),
            ts.hour(),
            ts.minute(),
            ts.second()
        );
    }

    match raw.get(..19) {
        Some(head) if head.as_bytes()[10] == b'T' => head.replacen('T', " ", 1),
        _ => raw.to_string(),
    }
}

pub fn format_countdown(countdown: Countdown) -> String {
    if countdown.days > 0 {
        format!(
            "{}d {}h {}m",
            countdown.days, countdown.hours, countdown.minutes
        )
    } else {
        format!("{}h {}m", countdown.hours, countdown.minutes)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
