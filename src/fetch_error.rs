#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("No data in response")]
    NoData,
    #[error("Failed to decode response: {0}")]
    DecodingError(String),
    #[error("Unknown site id: {0}")]
    InvalidSiteId(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::RequestFailed(e.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::DecodingError(e.to_string())
    }
}
