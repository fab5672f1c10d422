//! Date parsing for provider responses.

use chrono::NaiveDate;

/// Formats seen in registrar and panel responses, tried in order.
const DATE_FORMATS: [&str; 4] = ["%m/%d/%Y", "%Y-%m-%d", "%d-%b-%Y", "%Y/%m/%d"];

/// Parses a provider date, ignoring any time-of-day suffix.
pub fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split([' ', 'T']).next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}
