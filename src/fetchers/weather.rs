use std::sync::Arc;

use tracing::{debug, instrument};

use crate::fetch_error::FetchError;
use crate::fetchers::build_url;
use crate::http_client::HttpTransport;
use crate::models::{Coordinates, WeatherSnapshot};
use crate::parsers::weather::parse_weather;

/// Current-weather endpoint; imperial units so temperatures come back in °F.
#[derive(Clone)]
pub struct WeatherFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: String, api_key: Option<String>) -> Self {
        Self {
            transport,
            base_url,
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self), fields(source = "weather"))]
    pub async fn fetch_weather(&self, at: Coordinates) -> Result<WeatherSnapshot, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::InvalidUrl("no weather API key configured".to_string()))?;
        let lat = at.latitude.to_string();
        let lon = at.longitude.to_string();
        let url = build_url(
            &self.base_url,
            &[("lat", &lat), ("lon", &lon), ("units", "imperial"), ("appid", api_key)],
        )?;
        let text = self.transport.get(&url).await?;
        let weather = parse_weather(&text)?;
        debug!("High {}°F, low {}°F", weather.high_temperature_f, weather.low_temperature_f);
        Ok(weather)
    }
}
