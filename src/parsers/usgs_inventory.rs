/// USGS site inventory (coordinate) parser
///
/// The inventory service answers in RDB with two distinct layouts depending on how
/// it is queried, so each layout is its own schema:
///
/// ```text
/// single station:  agency_cd  site_no  station_nm  dec_lat_va  dec_long_va
/// bulk by state:   agency_cd  site_no  station_nm  site_tp_cd  dec_lat_va  dec_long_va
/// ```
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::models::Coordinates;
use crate::parsers::{rdb_data_lines, Parsed};

pub const HEADER_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySchema {
    SingleStation,
    BulkState,
}

impl InventorySchema {
    pub fn min_fields(&self) -> usize {
        match self {
            InventorySchema::SingleStation => 5,
            InventorySchema::BulkState => 6,
        }
    }

    /// Column offsets of (site_no, station_nm, dec_lat_va, dec_long_va).
    fn columns(&self) -> (usize, usize, usize, usize) {
        match self {
            InventorySchema::SingleStation => (1, 2, 3, 4),
            InventorySchema::BulkState => (1, 2, 4, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteCoordinates {
    /// Bare numeric site number, without any agency prefix.
    pub site_number: String,
    pub station_name: String,
    pub coordinates: Coordinates,
}

#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_inventory(text: &str, schema: InventorySchema) -> Result<Parsed<SiteCoordinates>, FetchError> {
    if text.trim().is_empty() {
        return Err(FetchError::NoData);
    }

    let (site_col, name_col, lat_col, lon_col) = schema.columns();
    let mut sites = Vec::new();
    let mut skipped = 0;

    for line in rdb_data_lines(text).skip(HEADER_LINES) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < schema.min_fields() {
            skipped += 1;
            continue;
        }

        let latitude = fields[lat_col].trim().parse::<f64>();
        let longitude = fields[lon_col].trim().parse::<f64>();
        let site_number = fields[site_col].trim();

        match (latitude, longitude) {
            (Ok(latitude), Ok(longitude)) if !site_number.is_empty() => {
                sites.push(SiteCoordinates {
                    site_number: site_number.to_string(),
                    station_name: fields[name_col].trim().to_string(),
                    coordinates: Coordinates { latitude, longitude },
                });
            }
            _ => {
                debug!("Dropping inventory row without usable coordinates: {}", line);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} inventory rows ({:?} schema)", skipped, schema);
    }

    Ok(Parsed::new(sites, skipped))
}

/// Single-station lookup: the row for `site_number`, or `NoData` when the inventory lacks it.
pub fn parse_single_station(text: &str, site_number: &str) -> Result<SiteCoordinates, FetchError> {
    let parsed = parse_inventory(text, InventorySchema::SingleStation)?;
    parsed
        .records
        .into_iter()
        .find(|site| site.site_number == site_number)
        .ok_or(FetchError::NoData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_schema_uses_shifted_columns() {
        let text = "#\n# USGS site inventory\nagency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t7s\t16s\t16s\nUSGS\t09058000\tCOLORADO RIVER NEAR KREMMLING, CO\tST\t40.0366\t-106.4395\nUSGS\t09060799\tBAD ROW\tST\n";

        let parsed = parse_inventory(text, InventorySchema::BulkState).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records[0].site_number, "09058000");
        assert_eq!(parsed.records[0].coordinates.latitude, 40.0366);
        assert_eq!(parsed.records[0].coordinates.longitude, -106.4395);
    }

    #[test]
    fn test_single_schema_reads_five_columns() {
        let text = "# inventory\nagency_cd\tsite_no\tstation_nm\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t16s\t16s\nUSGS\t07087050\tARKANSAS RIVER BELOW GRANITE, CO\t39.0425\t-106.2647\n";

        let site = parse_single_station(text, "07087050").unwrap();
        assert_eq!(site.station_name, "ARKANSAS RIVER BELOW GRANITE, CO");
        assert_eq!(site.coordinates.latitude, 39.0425);
    }

    #[test]
    fn test_single_row_read_with_bulk_schema_is_skipped() {
        let text = "agency_cd\tsite_no\tstation_nm\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t16s\t16s\nUSGS\t07087050\tARKANSAS RIVER\t39.0425\t-106.2647\n";

        let parsed = parse_inventory(text, InventorySchema::BulkState).unwrap();
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_single_station_missing_is_no_data() {
        let text = "agency_cd\tsite_no\tstation_nm\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t16s\t16s\n";
        assert_eq!(parse_single_station(text, "09058000").unwrap_err(), FetchError::NoData);
    }
}
