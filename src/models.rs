use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix the USGS current-conditions feed convention puts in front of site numbers.
pub const USGS_SITE_PREFIX: &str = "USGS ";

/// Storage overshoot allowed before a reservoir reading is capped.
pub const MAX_PERCENTAGE_FILLED: f64 = 125.0;

/// Acre-feet per day carried by a flow of one cubic foot per second.
pub const ACRE_FEET_PER_DAY_PER_CFS: f64 = 1.983471;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Agency {
    #[serde(rename = "USGS")]
    Usgs,
    #[serde(rename = "DWR")]
    Dwr,
}

impl Agency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agency::Usgs => "USGS",
            Agency::Dwr => "DWR",
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USGS" => Ok(Agency::Usgs),
            "DWR" => Ok(Agency::Dwr),
            other => Err(format!("unknown agency '{other}'")),
        }
    }
}

/// Identity of a station record: one record per (agency, site number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StationKey {
    pub agency: Agency,
    pub site_number: String,
}

impl StationKey {
    pub fn new(agency: Agency, site_number: impl Into<String>) -> Self {
        Self {
            agency,
            site_number: site_number.into(),
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agency, self.site_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowUnit {
    #[serde(rename = "cfs")]
    Cfs,
    #[serde(rename = "AF/day")]
    AcreFeetPerDay,
}

impl FlowUnit {
    /// Recognizes the unit labels used by USGS and DWR payloads.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "" | "cfs" | "ft3/s" => Some(FlowUnit::Cfs),
            "af" | "af/day" | "acft" | "acre-feet" | "afd" => Some(FlowUnit::AcreFeetPerDay),
            _ => None,
        }
    }

    pub fn to_cfs(&self, value: f64) -> f64 {
        match self {
            FlowUnit::Cfs => value,
            FlowUnit::AcreFeetPerDay => value / ACRE_FEET_PER_DAY_PER_CFS,
        }
    }
}

/// Flow value, always stored in cfs after conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowReading {
    pub value_cfs: f64,
    pub measured_at: DateTime<Utc>,
}

/// The unified river/station entity that every upstream source merges into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub agency: Agency,
    pub site_number: String,
    pub station_name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub flow: Option<FlowReading>,
    #[serde(default)]
    pub snotel_station_id: Option<String>,
    #[serde(default)]
    pub reservoir_site_ids: Vec<u32>,
    /// USGS cross-reference carried by DWR stations (`usgsSiteId`).
    #[serde(default)]
    pub usgs_site_id: Option<String>,
    #[serde(default)]
    pub linked_station: Option<StationKey>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl StationRecord {
    pub fn new(agency: Agency, site_number: impl Into<String>, station_name: impl Into<String>) -> Self {
        Self {
            agency,
            site_number: site_number.into(),
            station_name: station_name.into(),
            coordinates: None,
            flow: None,
            snotel_station_id: None,
            reservoir_site_ids: Vec::new(),
            usgs_site_id: None,
            linked_station: None,
            is_favorite: false,
            last_fetched_at: None,
        }
    }

    pub fn key(&self) -> StationKey {
        StationKey::new(self.agency, self.site_number.clone())
    }

    /// Site number without the "USGS " display prefix.
    pub fn bare_site_number(&self) -> &str {
        self.site_number
            .strip_prefix(USGS_SITE_PREFIX)
            .unwrap_or(&self.site_number)
            .trim()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageReading {
    pub date: NaiveDate,
    pub storage_acre_feet: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSnapshot {
    pub site_id: u32,
    pub reservoir_name: String,
    pub capacity_acre_feet: f64,
    pub readings: Vec<StorageReading>,
    pub percentage_filled: f64,
}

impl ReservoirSnapshot {
    pub fn latest(&self) -> Option<&StorageReading> {
        latest_storage(&self.readings)
    }
}

/// Most recent reading by date; input order is not trusted.
pub fn latest_storage(readings: &[StorageReading]) -> Option<&StorageReading> {
    readings.iter().max_by_key(|r| r.date)
}

/// Latest storage as a percentage of capacity, kept within `[0, 125]`.
pub fn percentage_filled(latest_storage_acre_feet: f64, capacity_acre_feet: f64) -> f64 {
    let percentage = (latest_storage_acre_feet / capacity_acre_feet) * 100.0;
    percentage.min(MAX_PERCENTAGE_FILLED).max(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowpackSnapshot {
    pub station_id: String,
    pub station_name: String,
    pub report_date: NaiveDate,
    pub snow_water_equivalent_in: f64,
    pub snow_depth_in: Option<f64>,
    pub percent_of_average: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub high_temperature_f: f64,
    pub low_temperature_f: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_filled_turquoise_lake() {
        let pct = percentage_filled(100_000.0, 129_440.0);
        assert!((pct - 77.2).abs() < 0.05, "got {pct}");
    }

    #[test]
    fn test_percentage_filled_caps_overshoot() {
        assert_eq!(percentage_filled(200_000.0, 129_440.0), 125.0);
        assert_eq!(percentage_filled(129_440.0 * 1.25, 129_440.0), 125.0);
    }

    #[test]
    fn test_percentage_filled_never_negative() {
        assert_eq!(percentage_filled(-50.0, 97_000.0), 0.0);
    }

    #[test]
    fn test_bare_site_number_strips_prefix() {
        let record = StationRecord::new(Agency::Usgs, "USGS 09058000", "COLORADO RIVER NEAR KREMMLING, CO");
        assert_eq!(record.bare_site_number(), "09058000");

        let dwr = StationRecord::new(Agency::Dwr, "ARKCANCO", "ARKANSAS RIVER AT CANON CITY");
        assert_eq!(dwr.bare_site_number(), "ARKCANCO");
    }

    #[test]
    fn test_flow_unit_conversion() {
        assert_eq!(FlowUnit::parse("CFS"), Some(FlowUnit::Cfs));
        assert_eq!(FlowUnit::parse("AF"), Some(FlowUnit::AcreFeetPerDay));
        assert_eq!(FlowUnit::parse("gallons"), None);

        let cfs = FlowUnit::AcreFeetPerDay.to_cfs(1.983471);
        assert!((cfs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_agency_from_str() {
        assert_eq!("usgs".parse::<Agency>().unwrap(), Agency::Usgs);
        assert_eq!("DWR".parse::<Agency>().unwrap(), Agency::Dwr);
        assert!("NRCS".parse::<Agency>().is_err());
    }

    #[test]
    fn test_latest_storage_ignores_input_order() {
        let readings = vec![
            StorageReading { date: NaiveDate::from_ymd_opt(2024, 4, 3).unwrap(), storage_acre_feet: 3.0 },
            StorageReading { date: NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(), storage_acre_feet: 5.0 },
            StorageReading { date: NaiveDate::from_ymd_opt(2024, 4, 4).unwrap(), storage_acre_feet: 4.0 },
        ];
        assert_eq!(latest_storage(&readings).unwrap().storage_acre_feet, 5.0);
    }
}
