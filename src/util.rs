// Date parsing and number formatting.
//
// Parsing lives here so the extraction code can work with typed dates, and
// formatting lives here so the template helpers and console output agree on
// how numbers look.
use crate::error::ExtractError;
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

pub const ISO_DATE: &str = "%Y-%m-%d";
pub const LONG_DATE: &str = "%A, %d %B %Y";

/// Parse `text` with a `chrono` format string.
///
/// No trimming or leniency: the record dates come straight from the API and
/// anything that does not match exactly is an error.
pub fn parse_date(text: &str, format: &str) -> Result<NaiveDate, ExtractError> {
    NaiveDate::parse_from_str(text, format).map_err(|source| ExtractError::Format {
        text: text.to_string(),
        format: format.to_string(),
        source,
    })
}

pub fn parse_iso_date(text: &str) -> Result<NaiveDate, ExtractError> {
    parse_date(text, ISO_DATE)
}

/// Render a date the way the report shows it, e.g. `Thursday, 10 June 2021`.
pub fn format_long_date(date: NaiveDate) -> String {
    date.format(LONG_DATE).to_string()
}

/// `n` rounded to `decimals` places with `,` between thousands, e.g.
/// `1,234.5`. A value that rounds to zero never gets a minus sign.
pub fn format_number(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut out = whole
        .parse::<u64>()
        .map(|w| w.to_formatted_string(&Locale::en))
        .unwrap_or_else(|_| whole.to_string());
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    let rounds_to_zero = !out.bytes().any(|b| matches!(b, b'1'..=b'9'));
    if n < 0.0 && !rounds_to_zero {
        out.insert(0, '-');
    }
    out
}

/// Record counts for the console, e.g. `1,024`.
pub fn format_count(n: usize) -> String {
    n.to_formatted_string(&Locale::en)
}
