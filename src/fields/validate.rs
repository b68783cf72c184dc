//! Invoice record validation
//!
//! Only the invoice date is canonicalized. Amount fields are left exactly as
//! received: strings like `1.234,56` use locale-specific separators that a
//! generic number parser would misread.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::map::INVOICE_DATE;
use super::NormalizedRecord;

/// Date-only layouts accepted for invoice dates (month and day may omit the leading zero)
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parses an invoice date in any of the supported layouts
///
/// Timestamps with an offset are converted to UTC before the date is taken.
pub fn parse_invoice_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        })
}

fn date_from_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_invoice_date(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Returns a copy of `record` with the invoice date in `YYYY-MM-DD` form
///
/// An unparsable date is kept unchanged and logged. No other field is touched.
pub fn validate_invoice_data(record: &NormalizedRecord) -> NormalizedRecord {
    let mut result = record.clone();

    let Some(raw) = record.get(INVOICE_DATE).filter(|v| !is_blank(v)) else {
        return result;
    };

    match date_from_value(raw) {
        Some(date) => {
            result.insert(INVOICE_DATE, Value::String(date.format("%Y-%m-%d").to_string()));
        }
        None => warn!(invoice_date = %raw, "Could not parse invoice date"),
    }

    result
}
