//! Display formatting for invoice values
//!
//! Amounts, dates, file sizes and file names as shown in the invoice lists.
//! Two locales are supported: German (`de-DE`, the default) and US English.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::fields::parse_invoice_date;

/// No-break space between amount and currency symbol
const NBSP: char = '\u{a0}';

const MONTHS_DE: [&str; 12] = [
    "Januar",
    "Februar",
    "März",
    "April",
    "Mai",
    "Juni",
    "Juli",
    "August",
    "September",
    "Oktober",
    "November",
    "Dezember",
];

const MONTHS_EN: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Display locale for amounts and dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// `1.234,56 €`, `5. März 2024`
    #[default]
    German,
    /// `€1,234.56`, `March 5, 2024`
    English,
}

#[derive(Debug, Error)]
#[error("Unsupported locale: '{0}'. Supported locales: de-DE, en-US")]
pub struct UnknownLocale(String);

impl FromStr for Locale {
    type Err = UnknownLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "de" | "de-de" | "de-at" | "de-ch" => Ok(Locale::German),
            "en" | "en-us" | "en-gb" => Ok(Locale::English),
            _ => Err(UnknownLocale(s.to_string())),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::German => write!(f, "de-DE"),
            Locale::English => write!(f, "en-US"),
        }
    }
}

impl Locale {
    fn separators(self) -> (char, char) {
        match self {
            Locale::German => ('.', ','),
            Locale::English => (',', '.'),
        }
    }
}

/// Parses an amount string written with either decimal convention
///
/// Currency symbols and spaces are ignored. When both `.` and `,` appear, the
/// last one is the decimal separator. A single separator is decimal unless it
/// repeats, in which case it groups thousands.
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(*c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) if cleaned.matches('.').count() == 1 => Some('.'),
        (None, Some(_)) if cleaned.matches(',').count() == 1 => Some(','),
        _ => None,
    };

    let normalized: String = cleaned
        .chars()
        .filter_map(|c| match c {
            '.' | ',' if Some(c) == decimal => Some('.'),
            '.' | ',' => None,
            other => Some(other),
        })
        .collect();

    normalized.parse().ok().filter(|n: &f64| n.is_finite())
}

fn currency_symbol(currency: &str) -> &str {
    match currency {
        "EUR" => "€",
        "USD" => "$",
        "GBP" => "£",
        other => other,
    }
}

fn group_digits(mut whole: u128, separator: char) -> String {
    let mut groups = Vec::new();
    loop {
        if whole < 1000 {
            groups.push(whole.to_string());
            break;
        }
        groups.push(format!("{:03}", whole % 1000));
        whole /= 1000;
    }
    groups.reverse();
    groups.join(&separator.to_string())
}

/// Renders `amount` with two decimals in `locale` style
pub fn format_money(amount: f64, locale: Locale, currency: &str) -> String {
    let (thousands, decimal) = locale.separators();
    let cents = (amount.abs() * 100.0).round() as u128;
    let number = format!(
        "{}{}{:02}",
        group_digits(cents / 100, thousands),
        decimal,
        cents % 100
    );
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    let symbol = currency_symbol(currency);

    match locale {
        Locale::German => format!("{sign}{number}{NBSP}{symbol}"),
        Locale::English if symbol.chars().all(|c| c.is_ascii_alphabetic()) => {
            format!("{sign}{symbol}{NBSP}{number}")
        }
        Locale::English => format!("{sign}{symbol}{number}"),
    }
}

fn amount_from_value(amount: &Value) -> Option<f64> {
    match amount {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Formats an amount for editing views
///
/// Missing or empty amounts become an empty string; text that does not parse
/// as a number is returned as is.
pub fn format_currency(amount: &Value, locale: Locale, currency: &str) -> String {
    match amount {
        Value::Null => String::new(),
        Value::String(s) if s.is_empty() => String::new(),
        other => match amount_from_value(other) {
            Some(n) => format_money(n, locale, currency),
            None => match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            },
        },
    }
}

/// Formats an amount for list views, `N/A` when it is missing or not numeric
pub fn format_invoice_amount(amount: &Value, locale: Locale, currency: &str) -> String {
    amount_from_value(amount)
        .map(|n| format_money(n, locale, currency))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Long-form date in `locale`
pub fn format_long_date(date: NaiveDate, locale: Locale) -> String {
    let month = date.month0() as usize;
    match locale {
        Locale::German => format!("{}. {} {}", date.day(), MONTHS_DE[month], date.year()),
        Locale::English => format!("{} {}, {}", MONTHS_EN[month], date.day(), date.year()),
    }
}

/// Formats a date string for display, `N/A` when empty
///
/// Unparsable input is returned unchanged.
pub fn format_date(date: &str, locale: Locale) -> String {
    if date.trim().is_empty() {
        return "N/A".to_string();
    }

    match parse_invoice_date(date) {
        Some(parsed) => format_long_date(parsed, locale),
        None => {
            warn!(date, "Error formatting date");
            date.to_string()
        }
    }
}

/// Human-readable size with a 1024 base, e.g. `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{size:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}

/// Last component of a Windows or Unix path, `Unknown` when empty
pub fn extract_filename(path: &str) -> &str {
    if path.is_empty() {
        return "Unknown";
    }
    path.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}

/// Whether an API response envelope reports `"success": true`
pub fn is_success_response(response: &Value) -> bool {
    response.get("success") == Some(&Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_amount_conventions() {
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("19,99 €"), Some(19.99));
        assert_eq!(parse_amount("$ 12.5"), Some(12.5));
        assert_eq!(parse_amount("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_amount("-5,00"), Some(-5.0));
        assert_eq!(parse_amount("EUR"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_format_currency_german() {
        assert_eq!(
            format_currency(&json!("1.234,56"), Locale::German, "EUR"),
            "1.234,56\u{a0}€"
        );
        assert_eq!(
            format_currency(&json!(1234567.891), Locale::German, "EUR"),
            "1.234.567,89\u{a0}€"
        );
        assert_eq!(
            format_currency(&json!(-3), Locale::German, "EUR"),
            "-3,00\u{a0}€"
        );
    }

    #[test]
    fn test_format_currency_english() {
        assert_eq!(
            format_currency(&json!(1234.5), Locale::English, "EUR"),
            "€1,234.50"
        );
        assert_eq!(
            format_currency(&json!("99"), Locale::English, "CHF"),
            "CHF\u{a0}99.00"
        );
    }

    #[test]
    fn test_format_currency_missing_and_raw() {
        assert_eq!(format_currency(&Value::Null, Locale::German, "EUR"), "");
        assert_eq!(format_currency(&json!(""), Locale::German, "EUR"), "");
        assert_eq!(
            format_currency(&json!("auf Anfrage"), Locale::German, "EUR"),
            "auf Anfrage"
        );
    }

    #[test]
    fn test_format_invoice_amount_not_available() {
        assert_eq!(format_invoice_amount(&Value::Null, Locale::German, "EUR"), "N/A");
        assert_eq!(format_invoice_amount(&json!("n/a"), Locale::German, "EUR"), "N/A");
        assert_eq!(
            format_invoice_amount(&json!("0,5"), Locale::German, "EUR"),
            "0,50\u{a0}€"
        );
    }

    #[test]
    fn test_format_date_locales() {
        assert_eq!(format_date("2024-03-05", Locale::German), "5. März 2024");
        assert_eq!(format_date("2024-12-24", Locale::English), "December 24, 2024");
        assert_eq!(format_date("", Locale::German), "N/A");
        assert_eq!(format_date("irgendwann", Locale::German), "irgendwann");
    }

    #[test]
    fn test_locale_from_str() {
        assert_eq!("de-DE".parse::<Locale>().unwrap(), Locale::German);
        assert_eq!("en_US".parse::<Locale>().unwrap(), Locale::English);
        assert!("fr-FR".parse::<Locale>().is_err());
        assert_eq!(Locale::default().to_string(), "de-DE");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("/srv/invoices/2024/R100.pdf"), "R100.pdf");
        assert_eq!(extract_filename(r"C:\Rechnungen\R100.pdf"), "R100.pdf");
        assert_eq!(extract_filename("R100.pdf"), "R100.pdf");
        assert_eq!(extract_filename(""), "Unknown");
    }

    #[test]
    fn test_is_success_response() {
        assert!(is_success_response(&json!({"success": true, "data": []})));
        assert!(!is_success_response(&json!({"success": "true"})));
        assert!(!is_success_response(&json!({"error": "nope"})));
        assert!(!is_success_response(&Value::Null));
    }
}
