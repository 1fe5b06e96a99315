/// Colorado DWR surface-water JSON parser
///
/// Both DWR endpoints wrap their rows in a `ResultList` array, but the rows differ
/// by endpoint: the station catalog carries `stationNum`/`abbrev`/`usgsSiteId`/
/// `dataSource`, the daily time series carries `abbrev`/`measDate`/`value`. Each row
/// is classified into one `DwrRecord` shape here so that nothing downstream looks
/// keys up by name.
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::{Coordinates, FlowReading, FlowUnit};
use crate::parsers::{parse_local_timestamp, Parsed};

/// Station catalog rows are kept only when `dataSource` contains this (any case).
pub const DWR_DATA_SOURCE_MARKER: &str = "dwr";

#[derive(Debug, Clone, PartialEq)]
pub struct DwrStation {
    pub station_num: Option<i64>,
    pub abbrev: String,
    pub station_name: String,
    pub usgs_site_id: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DwrFlowPoint {
    pub abbrev: Option<String>,
    pub reading: FlowReading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DwrRecord {
    Station(DwrStation),
    FlowPoint(DwrFlowPoint),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "ResultList")]
    result_list: Option<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStation {
    station_num: Option<i64>,
    abbrev: Option<String>,
    station_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    usgs_site_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    data_source: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFlowPoint {
    abbrev: Option<String>,
    meas_date: String,
    value: Option<f64>,
    meas_unit: Option<String>,
}

/// Accepts a string or a number; anything else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn result_list(text: &str) -> Result<Vec<Value>, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(rows) => Ok(rows),
        other => {
            let envelope: Envelope = serde_json::from_value(other)?;
            envelope
                .result_list
                .ok_or_else(|| FetchError::DecodingError("missing ResultList".to_string()))
        }
    }
}

/// Classifies one `ResultList` row by its shape.
pub fn classify(row: &Value) -> Result<DwrRecord, String> {
    let object = row.as_object().ok_or("row is not an object")?;

    if object.contains_key("measDate") {
        let raw: RawFlowPoint = serde_json::from_value(row.clone()).map_err(|e| e.to_string())?;
        let value = raw.value.ok_or("flow point without value")?;
        let unit_label = raw.meas_unit.unwrap_or_default();
        let unit = FlowUnit::parse(&unit_label).ok_or_else(|| format!("unknown flow unit '{unit_label}'"))?;
        let measured_at = parse_meas_date(&raw.meas_date)?;

        return Ok(DwrRecord::FlowPoint(DwrFlowPoint {
            abbrev: raw.abbrev,
            reading: FlowReading {
                value_cfs: unit.to_cfs(value),
                measured_at,
            },
        }));
    }

    if object.contains_key("stationNum") || object.contains_key("stationName") {
        let raw: RawStation = serde_json::from_value(row.clone()).map_err(|e| e.to_string())?;
        let abbrev = raw
            .abbrev
            .filter(|a| !a.trim().is_empty())
            .ok_or("station without abbrev")?;
        let coordinates = match (raw.latitude, raw.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        };

        return Ok(DwrRecord::Station(DwrStation {
            station_num: raw.station_num,
            station_name: raw.station_name.unwrap_or_else(|| abbrev.clone()),
            abbrev: abbrev.trim().to_string(),
            usgs_site_id: raw.usgs_site_id,
            coordinates,
            data_source: raw.data_source.unwrap_or_default(),
        }));
    }

    Err("unrecognized DWR row shape".to_string())
}

/// `measDate` arrives as `2024-04-17T00:00:00`, `2024-04-17 00:00:00` or `2024-04-17`.
fn parse_meas_date(value: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    let normalized = value.trim().replacen('T', " ", 1);
    let normalized = if normalized.len() == 10 {
        format!("{normalized} 00:00")
    } else {
        normalized
    };
    parse_local_timestamp(&normalized, "")
}

#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_station_list(text: &str) -> Result<Parsed<DwrStation>, FetchError> {
    let rows = result_list(text)?;
    let mut stations = Vec::new();
    let mut skipped = 0;

    for row in &rows {
        match classify(row) {
            Ok(DwrRecord::Station(station)) => {
                if station.data_source.to_ascii_lowercase().contains(DWR_DATA_SOURCE_MARKER) {
                    stations.push(station);
                }
            }
            Ok(DwrRecord::FlowPoint(_)) => skipped += 1,
            Err(e) => {
                debug!("Skipping DWR station row: {}", e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} DWR station rows", skipped);
    }
    debug!("Kept {} of {} DWR stations", stations.len(), rows.len());

    Ok(Parsed::new(stations, skipped))
}

#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_flow_series(text: &str) -> Result<Parsed<DwrFlowPoint>, FetchError> {
    let rows = result_list(text)?;
    let mut points = Vec::new();
    let mut skipped = 0;

    for row in &rows {
        match classify(row) {
            Ok(DwrRecord::FlowPoint(point)) => points.push(point),
            Ok(DwrRecord::Station(_)) => skipped += 1,
            Err(e) => {
                debug!("Skipping DWR flow row: {}", e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} DWR flow rows", skipped);
    }

    Ok(Parsed::new(points, skipped))
}

/// Most recent point by `measDate`.
pub fn latest_point(points: &[DwrFlowPoint]) -> Option<&DwrFlowPoint> {
    points.iter().max_by_key(|p| p.reading.measured_at)
}
