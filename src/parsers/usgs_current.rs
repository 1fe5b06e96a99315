/// USGS current-conditions parser
///
/// The state current-conditions report is an RDB table: any number of `#` comment
/// lines, a column-name header, a column-format header, then one tab-separated row
/// per site. Columns are positional:
///
/// ```text
/// agency_cd  site_no  station_nm  site_tp_cd  dd_nu  result_dt  result_tz  result_va  result_cd
/// ```
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::{FlowReading, USGS_SITE_PREFIX};
use crate::parsers::{parse_local_timestamp, rdb_data_lines, Parsed};

/// Non-comment header lines that precede the first data row.
pub const HEADER_LINES: usize = 2;
pub const MIN_FIELDS: usize = 9;

const AGENCY_COL: usize = 0;
const SITE_NO_COL: usize = 1;
const STATION_NAME_COL: usize = 2;
const DATE_COL: usize = 5;
const TZ_COL: usize = 6;
const FLOW_COL: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditionsRow {
    pub agency_code: String,
    /// Site number with the "USGS " prefix, as the rest of the aggregate keys it.
    pub site_number: String,
    pub station_name: String,
    /// Absent when the value column holds a status code ("Ice", "Eqp", ...) or the date is unusable.
    pub flow: Option<FlowReading>,
}

#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_current_conditions(text: &str) -> Result<Parsed<CurrentConditionsRow>, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let mut rows = Vec::new();
    let mut skipped = 0;

    for line in rdb_data_lines(text).skip(HEADER_LINES) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < MIN_FIELDS {
            debug!("Dropping row with {} fields: {}", fields.len(), line);
            skipped += 1;
            continue;
        }

        let site_no = fields[SITE_NO_COL].trim();
        if site_no.is_empty() {
            skipped += 1;
            continue;
        }

        let flow = parse_flow(fields[FLOW_COL], fields[DATE_COL], fields[TZ_COL]);
        if flow.is_none() {
            debug!("No usable flow for site {}: value='{}' date='{}'", site_no, fields[FLOW_COL], fields[DATE_COL]);
        }

        rows.push(CurrentConditionsRow {
            agency_code: fields[AGENCY_COL].trim().to_string(),
            site_number: format!("{USGS_SITE_PREFIX}{site_no}"),
            station_name: fields[STATION_NAME_COL].trim().to_string(),
            flow,
        });
    }

    if skipped > 0 {
        warn!("Skipped {} malformed current-conditions rows", skipped);
    }
    debug!("Parsed {} current-conditions rows", rows.len());

    Ok(Parsed::new(rows, skipped))
}

fn parse_flow(value: &str, date: &str, tz: &str) -> Option<FlowReading> {
    let value_cfs = value.trim().replace(',', "").parse::<f64>().ok()?;
    let measured_at = parse_local_timestamp(date, tz).ok()?;
    Some(FlowReading { value_cfs, measured_at })
}
