// Upstream wire-format parsers
//
// Each submodule decodes one upstream format into normalized records. Malformed
// individual rows are skipped and counted, never fatal; only a response that is
// unusable as a whole produces a `FetchError`.

pub mod dwr;
pub mod reservoir;
pub mod snotel;
pub mod usgs_current;
pub mod usgs_inventory;
pub mod usgs_iv;
pub mod weather;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Records decoded from one response, plus the number of rows that were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Parsed<T> {
    pub fn new(records: Vec<T>, skipped: usize) -> Self {
        Self { records, skipped }
    }
}

/// RDB lines with `#` comments and blank lines removed.
pub(crate) fn rdb_data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
}

/// Mountain standard time, assumed when a feed omits its zone code.
const DEFAULT_UTC_OFFSET_HOURS: i32 = -7;

fn zone_offset_hours(tz_code: &str) -> Option<i32> {
    match tz_code.trim().to_ascii_uppercase().as_str() {
        "" => Some(DEFAULT_UTC_OFFSET_HOURS),
        "UTC" | "GMT" | "Z" => Some(0),
        "EST" => Some(-5),
        "EDT" | "AST" => Some(-4),
        "CST" => Some(-6),
        "CDT" => Some(-5),
        "MST" => Some(-7),
        "MDT" => Some(-6),
        "PST" => Some(-8),
        "PDT" => Some(-7),
        _ => None,
    }
}

/// Parses a USGS local timestamp (`YYYY-MM-DD HH:MM`, optional seconds) with its zone code.
pub(crate) fn parse_local_timestamp(value: &str, tz_code: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("bad timestamp '{value}': {e}"))?;

    let hours = zone_offset_hours(tz_code).ok_or_else(|| format!("unknown time zone '{tz_code}'"))?;
    let offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| format!("bad offset {hours}"))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("ambiguous local time '{value}'"))
}
