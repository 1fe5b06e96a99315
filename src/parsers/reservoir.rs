/// Bureau of Reclamation reservoir JSON parser.
///
/// The hydrodata endpoint wraps its series as `{"columns": [...], "data": [[date, value], ...]}`
/// where the inner arrays mix strings, numbers and nulls.
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::StorageReading;
use crate::parsers::Parsed;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Deserialize)]
struct ReservoirResponse {
    #[serde(default)]
    data: Vec<Value>,
}

fn coerce_entry(entry: &Value) -> Result<StorageReading, String> {
    let pair = entry.as_array().ok_or("entry is not an array")?;
    if pair.len() < 2 {
        return Err(format!("entry has {} elements", pair.len()));
    }

    let date_str = pair[0].as_str().ok_or("date is not a string")?;
    let date = NaiveDate::parse_from_str(date_str.trim(), DATE_FORMAT)
        .map_err(|e| format!("bad date '{date_str}': {e}"))?;

    let storage_acre_feet = match &pair[1] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| format!("no storage value on {date}"))?;

    Ok(StorageReading {
        date,
        storage_acre_feet,
    })
}

#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_storage_series(text: &str) -> Result<Parsed<StorageReading>, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let response: ReservoirResponse = serde_json::from_str(text)?;
    let mut readings = Vec::with_capacity(response.data.len());
    let mut skipped = 0;

    for entry in &response.data {
        match coerce_entry(entry) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                debug!("Dropping reservoir entry: {}", e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Dropped {} of {} reservoir entries", skipped, response.data.len());
    }

    Ok(Parsed::new(readings, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_entries_are_dropped_individually() {
        let text = r#"{
            "columns": ["datetime", "storage"],
            "data": [
                ["2024-04-01", 98000.0],
                ["2024-04-02", null],
                ["04/03/2024", 98500.0],
                ["2024-04-04", "99000"],
                [20240405, 99100.0],
                ["2024-04-06"]
            ]
        }"#;

        let parsed = parse_storage_series(text).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 4);
        assert_eq!(parsed.records[1].storage_acre_feet, 99000.0);
    }

    #[test]
    fn test_non_finite_storage_strings_are_dropped() {
        let text = r#"{"data": [["2024-04-01", "NaN"], ["2024-04-02", "inf"], ["2024-04-03", "-infinity"], ["2024-04-04", "97000"]]}"#;

        let parsed = parse_storage_series(text).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.records[0].storage_acre_feet, 97000.0);
    }

    #[test]
    fn test_missing_data_key_is_empty() {
        let parsed = parse_storage_series(r#"{"columns": []}"#).unwrap();
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn test_not_json_is_decoding_error() {
        assert!(matches!(parse_storage_series("<html></html>"), Err(FetchError::DecodingError(_))));
    }
}
