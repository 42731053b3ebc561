//! Formatting helpers shared by the document kinds.

use chrono::{Datelike, Local, NaiveDate};

/// Printed in place of the signature when no image is supplied.
pub const SIGNATURE_FALLBACK: &str = "____________________\nSignature";

/// Signature image box in pixels.
pub const SIGNATURE_WIDTH_PX: u32 = 180;
pub const SIGNATURE_HEIGHT_PX: u32 = 80;

const MONTHS: [&str; 12] = [
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

/// Format a date as it appears in documents (e.g. "30 December 2025").
pub fn format_document_date(date: NaiveDate) -> String {
    let month = MONTHS[(date.month0() as usize).min(MONTHS.len() - 1)];
    format!("{} {} {}", date.day(), month, date.year())
}

/// Today's date in document format.
pub fn today() -> String {
    format_document_date(Local::now().date_naive())
}

/// Parse a user-entered amount. Thousands separators (`,`) and spaces are
/// ignored.
pub fn parse_amount(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Format an amount with thousands separators and two decimals.
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}
