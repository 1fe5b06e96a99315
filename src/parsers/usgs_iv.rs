/// USGS instantaneous-values (IV) RDB parser.
///
/// Data rows start with the agency code; columns are
/// `agency_cd  site_no  datetime  tz_cd  <value>  <qualifier>`. Rows are not assumed
/// to be sorted.
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::FlowReading;
use crate::parsers::parse_local_timestamp;

pub const AGENCY_MARKER: &str = "USGS";
const MIN_FIELDS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct LatestFlow {
    pub site_number: String,
    pub reading: FlowReading,
    pub skipped: usize,
}

/// Full scan that keeps the row whose timestamp is strictly newer than any seen before it.
#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_latest_flow(text: &str) -> Result<LatestFlow, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let mut latest: Option<(String, FlowReading)> = None;
    let mut skipped = 0;
    let mut rows = 0;

    for line in text.lines().filter(|l| l.starts_with(AGENCY_MARKER)) {
        rows += 1;
        let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
        if fields.len() < MIN_FIELDS {
            skipped += 1;
            continue;
        }

        let measured_at = match parse_local_timestamp(fields[2], fields[3]) {
            Ok(ts) => ts,
            Err(e) => {
                debug!("Skipping IV row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let value_cfs = match fields[4].trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let is_newer = latest
            .as_ref()
            .map_or(true, |(_, current)| measured_at > current.measured_at);
        if is_newer {
            latest = Some((fields[1].trim().to_string(), FlowReading { value_cfs, measured_at }));
        }
    }

    if skipped > 0 {
        warn!("Skipped {} of {} IV rows", skipped, rows);
    }

    let (site_number, reading) = latest.ok_or(FetchError::NoData)?;
    Ok(LatestFlow {
        site_number,
        reading,
        skipped,
    })
}
