use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::Endpoints;
use crate::fetch_error::FetchError;
use crate::fetchers::{bare_usgs_site, build_url};
use crate::http_client::HttpTransport;
use crate::parsers::usgs_current::{parse_current_conditions, CurrentConditionsRow};
use crate::parsers::usgs_inventory::{parse_inventory, parse_single_station, InventorySchema, SiteCoordinates};
use crate::parsers::usgs_iv::{parse_latest_flow, LatestFlow};
use crate::parsers::Parsed;

/// Discharge in cubic feet per second.
pub const DISCHARGE_PARAMETER_CODE: &str = "00060";
pub const STATE_CODE: &str = "co";

const CURRENT_CONDITIONS_PARAMS: &[(&str, &str)] = &[
    ("index_pmcode_STATION_NM", "1"),
    ("index_pmcode_DATETIME", "2"),
    ("index_pmcode_00060", "3"),
    ("group_key", "NONE"),
    ("sitefile_output_format", "html_table"),
    ("column_name", "agency_cd"),
    ("column_name", "site_no"),
    ("column_name", "station_nm"),
    ("sort_key_2", "site_no"),
    ("html_table_group_key", "NONE"),
    ("format", "rdb"),
    ("rdb_compression", "value"),
    ("list_of_search_criteria", "realtime_parameter_selection"),
];

#[derive(Clone)]
pub struct UsgsFetcher {
    transport: Arc<dyn HttpTransport>,
    current_url: String,
    inventory_url: String,
    iv_url: String,
}

impl UsgsFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: &Endpoints) -> Self {
        Self {
            transport,
            current_url: endpoints.usgs_current_url.clone(),
            inventory_url: endpoints.usgs_inventory_url.clone(),
            iv_url: endpoints.usgs_iv_url.clone(),
        }
    }

    /// State-wide current-conditions report: one row per realtime site.
    #[instrument(skip(self), fields(source = "usgs_current", url = %self.current_url))]
    pub async fn fetch_current_conditions(&self) -> Result<Parsed<CurrentConditionsRow>, FetchError> {
        let url = build_url(&self.current_url, CURRENT_CONDITIONS_PARAMS)?;
        debug!("Requesting current conditions");
        let text = self.transport.get(&url).await?;
        let parsed = parse_current_conditions(&text)?;
        info!(
            "Parsed {} current-condition rows ({} skipped)",
            parsed.records.len(),
            parsed.skipped
        );
        Ok(parsed)
    }

    /// Bulk coordinates for every stream site in the state.
    #[instrument(skip(self), fields(source = "usgs_inventory", url = %self.inventory_url))]
    pub async fn fetch_state_coordinates(&self) -> Result<Parsed<SiteCoordinates>, FetchError> {
        let url = build_url(
            &self.inventory_url,
            &[
                ("state_cd", STATE_CODE),
                ("site_tp_cd", "ST"),
                ("group_key", "NONE"),
                ("format", "sitefile_output"),
                ("sitefile_output_format", "rdb"),
                ("column_name", "agency_cd,site_no,station_nm,site_tp_cd,dec_lat_va,dec_long_va"),
                ("list_of_search_criteria", "state_cd,site_tp_cd"),
            ],
        )?;
        let text = self.transport.get(&url).await?;
        let parsed = parse_inventory(&text, InventorySchema::BulkState)?;
        info!("Parsed {} site coordinates ({} skipped)", parsed.records.len(), parsed.skipped);
        Ok(parsed)
    }

    /// Coordinates for one site; accepts the site number with or without the "USGS " prefix.
    #[instrument(skip(self), fields(source = "usgs_inventory"))]
    pub async fn fetch_site_coordinates(&self, site_number: &str) -> Result<SiteCoordinates, FetchError> {
        let site = bare_usgs_site(site_number)?;
        let url = build_url(
            &self.inventory_url,
            &[
                ("search_site_no", site),
                ("search_site_no_match_type", "exact"),
                ("group_key", "NONE"),
                ("format", "sitefile_output"),
                ("sitefile_output_format", "rdb"),
                ("column_name", "agency_cd,site_no,station_nm,dec_lat_va,dec_long_va"),
                ("list_of_search_criteria", "search_site_no"),
            ],
        )?;
        let text = self.transport.get(&url).await?;
        parse_single_station(&text, site)
    }

    /// Latest discharge reading from the last day of instantaneous values.
    #[instrument(skip(self), fields(source = "usgs_iv"))]
    pub async fn fetch_latest_flow(&self, site_number: &str) -> Result<LatestFlow, FetchError> {
        let site = bare_usgs_site(site_number)?;
        let url = build_url(
            &self.iv_url,
            &[
                ("sites", site),
                ("parameterCd", DISCHARGE_PARAMETER_CODE),
                ("period", "P1D"),
                ("siteStatus", "all"),
                ("format", "rdb"),
            ],
        )?;
        let text = self.transport.get(&url).await?;
        let latest = parse_latest_flow(&text)?;
        debug!(
            "Latest flow for {} is {} cfs at {}",
            site, latest.reading.value_cfs, latest.reading.measured_at
        );
        Ok(latest)
    }
}
