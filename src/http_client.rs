use futures::future::BoxFuture;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::fetch_error::FetchError;

/// Black-box GET capability: the raw response body or a transport failure.
///
/// Fetchers only ever see this trait, so tests can substitute an in-memory transport.
pub trait HttpTransport: Send + Sync {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

/// reqwest-backed transport used in production.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("river-flow-service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            return Err(FetchError::RequestFailed(format!("HTTP {status} from {url}")));
        }

        let text = response.text().await?;
        debug!("Retrieved {} bytes", text.len());

        if text.trim().is_empty() {
            return Err(FetchError::NoData);
        }
        Ok(text)
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(self.fetch_text(url))
    }
}
