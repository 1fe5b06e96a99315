use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::http_client::HttpTransport;
use crate::models::{latest_storage, percentage_filled, ReservoirSnapshot};
use crate::parsers::reservoir::parse_storage_series;
use crate::registry::reservoir_info;

/// Reclamation's Upper Colorado hydrodata series 17 (storage, acre-feet).
const STORAGE_SERIES: &str = "17";

#[derive(Clone)]
pub struct ReservoirFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl ReservoirFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: String) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Storage history and percentage filled. The capacity lookup happens before any
    /// request, so an uncatalogued site fails with `InvalidSiteId` without touching the network.
    #[instrument(skip(self), fields(source = "reservoir"))]
    pub async fn fetch_reservoir(&self, site_id: u32) -> Result<ReservoirSnapshot, FetchError> {
        let info = reservoir_info(site_id).ok_or_else(|| {
            warn!("Reservoir {} has no known capacity", site_id);
            FetchError::InvalidSiteId(site_id.to_string())
        })?;

        let url = format!("{}/{}/json/{}.json", self.base_url, site_id, STORAGE_SERIES);
        let text = self.transport.get(&url).await?;
        let parsed = parse_storage_series(&text)?;

        let latest = latest_storage(&parsed.records).ok_or(FetchError::NoData)?;
        let filled = percentage_filled(latest.storage_acre_feet, info.capacity_acre_feet);
        debug!(
            "{} holds {} AF on {} ({:.1}% of {} AF)",
            info.name, latest.storage_acre_feet, latest.date, filled, info.capacity_acre_feet
        );

        Ok(ReservoirSnapshot {
            site_id,
            reservoir_name: info.name.to_string(),
            capacity_acre_feet: info.capacity_acre_feet,
            readings: parsed.records,
            percentage_filled: filled,
        })
    }
}
