//! One fetcher per upstream. Each owns its endpoint, query construction and
//! parser; all of them share a single [`HttpTransport`].
use std::sync::Arc;

use reqwest::Url;

use crate::config::Endpoints;
use crate::fetch_error::FetchError;
use crate::http_client::HttpTransport;

pub mod dwr;
pub mod reservoir;
pub mod snotel;
pub mod usgs;
pub mod weather;

pub use dwr::DwrFetcher;
pub use reservoir::ReservoirFetcher;
pub use snotel::SnotelFetcher;
pub use usgs::UsgsFetcher;
pub use weather::WeatherFetcher;

/// Every upstream fetcher, wired to the same transport.
#[derive(Clone)]
pub struct Fetchers {
    pub usgs: UsgsFetcher,
    pub dwr: DwrFetcher,
    pub snotel: SnotelFetcher,
    pub reservoirs: ReservoirFetcher,
    pub weather: WeatherFetcher,
}

impl Fetchers {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: &Endpoints, weather_api_key: Option<String>) -> Self {
        Self {
            usgs: UsgsFetcher::new(transport.clone(), endpoints),
            dwr: DwrFetcher::new(transport.clone(), endpoints.dwr_base_url.clone()),
            snotel: SnotelFetcher::new(transport.clone(), endpoints.snotel_base_url.clone()),
            reservoirs: ReservoirFetcher::new(transport.clone(), endpoints.reservoir_base_url.clone()),
            weather: WeatherFetcher::new(transport, endpoints.weather_base_url.clone(), weather_api_key),
        }
    }
}

pub(crate) fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
    Url::parse_with_params(base, params)
        .map(|url| url.to_string())
        .map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))
}

/// Strips the "USGS " prefix and insists on a purely numeric site number.
pub(crate) fn bare_usgs_site(site_number: &str) -> Result<&str, FetchError> {
    let bare = site_number
        .trim()
        .strip_prefix(crate::models::USGS_SITE_PREFIX)
        .unwrap_or(site_number.trim());
    if bare.is_empty() || !bare.chars().all(|c| c.is_ascii_digit()) {
        return Err(FetchError::InvalidSiteId(site_number.to_string()));
    }
    Ok(bare)
}
