use serde::Serialize;

pub const NOT_AVAILABLE: &str = "N/A";

/// Style class carried by the 24h change cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    Positive,
    Negative,
}

impl ChangeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeClass::Positive => "positive",
            ChangeClass::Negative => "negative",
        }
    }
}

pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(v) => format!("{v:.2}%"),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn change_class(change: Option<f64>) -> Option<ChangeClass> {
    change.map(|v| {
        if v >= 0.0 {
            ChangeClass::Positive
        } else {
            ChangeClass::Negative
        }
    })
}

/// Prices at or above 1 show cents; sub-unit prices keep up to 8 decimals so
/// small-cap coins do not collapse to zero.
pub fn format_price(price: f64) -> String {
    if price.abs() >= 1.0 {
        group_number(price, 2, 2)
    } else {
        group_number(price, 2, 8)
    }
}

/// Grouped like `Number.toLocaleString()` in en-US: up to 3 fraction digits.
pub fn format_market_cap(market_cap: f64) -> String {
    group_number(market_cap, 0, 3)
}

/// en-US thousands grouping with between `min_frac` and `max_frac` fraction
/// digits; trailing zeros beyond `min_frac` are trimmed.
pub fn group_number(value: f64, min_frac: usize, max_frac: usize) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    let max_frac = max_frac.max(min_frac);
    let fixed = format!("{:.*}", max_frac, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), ""),
    };

    let mut frac = frac_part.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let is_zero = int_part.bytes().all(|b| b == b'0') && frac.bytes().all(|b| b == b'0');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };

    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}
