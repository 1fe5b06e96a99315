use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::fetch_error::FetchError;
use crate::fetchers::build_url;
use crate::http_client::HttpTransport;
use crate::parsers::dwr::{latest_point, parse_flow_series, parse_station_list, DwrFlowPoint, DwrStation};
use crate::parsers::Parsed;

const MEAS_DATE_FORMAT: &str = "%m/%d/%Y";

/// Colorado Division of Water Resources surface-water REST API.
#[derive(Clone)]
pub struct DwrFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl DwrFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: String) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self), fields(source = "dwr_stations", url = %self.base_url))]
    pub async fn fetch_stations(&self) -> Result<Parsed<DwrStation>, FetchError> {
        let url = build_url(&format!("{}/surfacewaterstations/", self.base_url), &[("format", "json")])?;
        let text = self.transport.get(&url).await?;
        let parsed = parse_station_list(&text)?;
        info!("Parsed {} DWR stations ({} skipped)", parsed.records.len(), parsed.skipped);
        Ok(parsed)
    }

    /// Newest daily flow point for `abbrev` measured on or after `since`.
    #[instrument(skip(self), fields(source = "dwr_flow"))]
    pub async fn fetch_latest_flow(&self, abbrev: &str, since: NaiveDate) -> Result<DwrFlowPoint, FetchError> {
        if abbrev.is_empty() || !abbrev.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FetchError::InvalidSiteId(abbrev.to_string()));
        }
        let min_date = since.format(MEAS_DATE_FORMAT).to_string();
        let url = build_url(
            &format!("{}/surfacewatertsday/", self.base_url),
            &[
                ("format", "json"),
                ("dateFormat", "dateOnly"),
                ("fields", "abbrev,measDate,value,measUnit"),
                ("abbrev", abbrev),
                ("min-measDate", &min_date),
            ],
        )?;
        let text = self.transport.get(&url).await?;
        let parsed = parse_flow_series(&text)?;
        debug!("{} DWR flow points for {}", parsed.records.len(), abbrev);
        latest_point(&parsed.records).cloned().ok_or(FetchError::NoData)
    }
}
