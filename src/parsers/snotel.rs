/// NRCS/SNOTEL report-generator CSV parser.
///
/// The report generator emits `#` comment lines, one header row, then one row per day
/// in ascending date order. Headers embed the station, e.g.
/// `Fremont Pass (485) Snow Water Equivalent (in) Start of Day Values`.
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::SnowpackSnapshot;

#[derive(Debug, Default)]
struct Columns {
    swe: Option<usize>,
    depth: Option<usize>,
    percent: Option<usize>,
}

fn locate_columns(headers: &StringRecord) -> Columns {
    let mut columns = Columns::default();
    for (idx, header) in headers.iter().enumerate() {
        let lower = header.to_ascii_lowercase();
        let is_percent = lower.contains('%') || lower.contains("percent");
        if lower.contains("snow water equivalent") {
            if is_percent {
                columns.percent.get_or_insert(idx);
            } else {
                columns.swe.get_or_insert(idx);
            }
        } else if lower.contains("snow depth") && !is_percent {
            columns.depth.get_or_insert(idx);
        }
    }
    columns
}

/// Station name embedded in a report header, if the header carries one.
fn station_name_from_header(header: &str) -> Option<String> {
    let re = Regex::new(r"^\s*(.+?)\s*\(([^)]+)\)\s*Snow Water Equivalent").ok()?;
    re.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn optional_number(record: &StringRecord, idx: Option<usize>) -> Option<f64> {
    idx.and_then(|i| record.get(i))
        .and_then(|raw| raw.trim().parse::<f64>().ok())
}

/// Latest snowpack values: the last row whose date column starts with `2` (a year).
#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_snowpack(text: &str, station_id: &str) -> Result<SnowpackSnapshot, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FetchError::DecodingError(e.to_string()))?
        .clone();
    let columns = locate_columns(&headers);
    let swe_idx = columns
        .swe
        .ok_or_else(|| FetchError::DecodingError("no snow water equivalent column".to_string()))?;

    let mut latest: Option<StringRecord> = None;
    let mut skipped = 0;
    for result in reader.records() {
        match result {
            Ok(record) => {
                if record.get(0).is_some_and(|first| first.starts_with('2')) {
                    latest = Some(record);
                }
            }
            Err(e) => {
                debug!("Skipping SNOTEL row: {}", e);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("Skipped {} SNOTEL rows for station {}", skipped, station_id);
    }

    let latest = latest.ok_or(FetchError::NoData)?;
    let date_str = latest.get(0).unwrap_or_default();
    let report_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|e| FetchError::DecodingError(format!("bad report date '{date_str}': {e}")))?;
    let snow_water_equivalent_in = optional_number(&latest, Some(swe_idx)).ok_or_else(|| {
        FetchError::DecodingError(format!("no snow water equivalent on {report_date}"))
    })?;

    let station_name = headers
        .get(swe_idx)
        .and_then(station_name_from_header)
        .unwrap_or_else(|| station_id.to_string());

    Ok(SnowpackSnapshot {
        station_id: station_id.to_string(),
        station_name,
        report_date,
        snow_water_equivalent_in,
        snow_depth_in: optional_number(&latest, columns.depth),
        percent_of_average: optional_number(&latest, columns.percent),
    })
}
