use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, instrument};

use crate::fetch_error::FetchError;
use crate::http_client::HttpTransport;
use crate::models::SnowpackSnapshot;
use crate::parsers::snotel::parse_snowpack;

/// Last seven days of SWE, snow depth and SWE percent of the 1991-2020 median.
const REPORT_ELEMENTS: &str = "-6,0/WTEQ::value,SNWD::value,WTEQ::pctOfMedian_1991";

/// NRCS report generator for SNOTEL (SNTL network) stations.
#[derive(Clone)]
pub struct SnotelFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl SnotelFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: String) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn report_url(&self, station_id: &str, state: &str) -> Result<String, FetchError> {
        let valid_id = !station_id.is_empty() && station_id.chars().all(|c| c.is_ascii_alphanumeric());
        let valid_state = state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic());
        if !valid_id || !valid_state {
            return Err(FetchError::InvalidUrl(format!("bad SNOTEL triplet {station_id}:{state}")));
        }
        // The "|" and quote characters of the station triplet are pre-encoded.
        let raw = format!(
            "{}/{}:{}:SNTL%7Cid=%22%22%7Cname/{}",
            self.base_url,
            station_id,
            state.to_ascii_uppercase(),
            REPORT_ELEMENTS
        );
        Url::parse(&raw)
            .map(|url| url.to_string())
            .map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))
    }

    #[instrument(skip(self), fields(source = "snotel"))]
    pub async fn fetch_snowpack(&self, station_id: &str, state: &str) -> Result<SnowpackSnapshot, FetchError> {
        let url = self.report_url(station_id, state)?;
        let text = self.transport.get(&url).await?;
        let snapshot = parse_snowpack(&text, station_id)?;
        debug!(
            "SNOTEL {} reports {} in SWE on {}",
            station_id, snapshot.snow_water_equivalent_in, snapshot.report_date
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;

    struct NoTransport;

    impl HttpTransport for NoTransport {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
            Box::pin(async { Err(FetchError::NoData) })
        }
    }

    #[test]
    fn test_report_url_encodes_triplet() {
        let fetcher = SnotelFetcher::new(Arc::new(NoTransport), "https://wcc.example.gov/report/".to_string());
        let url = fetcher.report_url("1120", "co").unwrap();
        assert_eq!(
            url,
            "https://wcc.example.gov/report/1120:CO:SNTL%7Cid=%22%22%7Cname/-6,0/WTEQ::value,SNWD::value,WTEQ::pctOfMedian_1991"
        );
    }

    #[test]
    fn test_report_url_rejects_bad_station() {
        let fetcher = SnotelFetcher::new(Arc::new(NoTransport), "https://wcc.example.gov/report".to_string());
        assert!(matches!(fetcher.report_url("11 20", "CO"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(fetcher.report_url("1120", "Colorado"), Err(FetchError::InvalidUrl(_))));
    }
}
