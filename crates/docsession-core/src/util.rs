use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Convert a string to a safe filename.
pub fn safe_filename(name: &str) -> String {
    const UNSAFE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let mut result = name.to_string();
    for &c in UNSAFE {
        result = result.replace(c, "_");
    }
    result.trim().to_string()
}

/// Parse a stored timestamp string.
///
/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS[.fff]` form (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Fixed-width UTC RFC 3339 (`2024-01-01T00:00:00.000000Z`).
///
/// Byte order of these strings equals chronological order, which lets
/// backends without a native timestamp type compare them lexicographically.
pub fn sortable_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
