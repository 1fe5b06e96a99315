use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USGS_CURRENT_URL: &str = "https://waterdata.usgs.gov/co/nwis/current";
pub const DEFAULT_USGS_INVENTORY_URL: &str = "https://waterdata.usgs.gov/nwis/inventory";
pub const DEFAULT_USGS_IV_URL: &str = "https://nwis.waterservices.usgs.gov/nwis/iv/";
pub const DEFAULT_DWR_BASE_URL: &str = "https://dwr.state.co.us/Rest/GET/api/v2/surfacewater";
pub const DEFAULT_SNOTEL_BASE_URL: &str =
    "https://wcc.sc.egov.usda.gov/reportGenerator/view_csv/customSingleStationReport/daily/start_of_period";
pub const DEFAULT_RESERVOIR_BASE_URL: &str = "https://www.usbr.gov/uc/water/hydrodata/reservoir_data";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Base URLs for every upstream; overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub usgs_current_url: String,
    pub usgs_inventory_url: String,
    pub usgs_iv_url: String,
    pub dwr_base_url: String,
    pub snotel_base_url: String,
    pub reservoir_base_url: String,
    pub weather_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            usgs_current_url: DEFAULT_USGS_CURRENT_URL.to_string(),
            usgs_inventory_url: DEFAULT_USGS_INVENTORY_URL.to_string(),
            usgs_iv_url: DEFAULT_USGS_IV_URL.to_string(),
            dwr_base_url: DEFAULT_DWR_BASE_URL.to_string(),
            snotel_base_url: DEFAULT_SNOTEL_BASE_URL.to_string(),
            reservoir_base_url: DEFAULT_RESERVOIR_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Every endpoint rooted at one base URL (mock servers in tests).
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            usgs_current_url: format!("{base}/usgs/current"),
            usgs_inventory_url: format!("{base}/usgs/inventory"),
            usgs_iv_url: format!("{base}/usgs/iv"),
            dwr_base_url: format!("{base}/dwr"),
            snotel_base_url: format!("{base}/snotel"),
            reservoir_base_url: format!("{base}/reservoirs"),
            weather_base_url: format!("{base}/weather"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub refresh_interval_minutes: u64,
    pub fetch_timeout_secs: u64,
    pub favorites_dir: PathBuf,
    pub station_registry_path: PathBuf,
    pub weather_api_key: Option<String>,
    pub endpoints: Endpoints,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            server_host: var_or("SERVER_HOST", "0.0.0.0"),
            server_port: var_or("SERVER_PORT", "8080").parse().unwrap_or(8080),
            refresh_interval_minutes: var_or("REFRESH_INTERVAL_MINUTES", "15").parse().unwrap_or(15),
            fetch_timeout_secs: var_or("FETCH_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            favorites_dir: PathBuf::from(var_or("FAVORITES_DIR", ".")),
            station_registry_path: PathBuf::from(var_or("STATION_REGISTRY_PATH", "stations.toml")),
            weather_api_key: env::var("WEATHER_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            endpoints: Endpoints {
                usgs_current_url: var_or("USGS_CURRENT_URL", DEFAULT_USGS_CURRENT_URL),
                usgs_inventory_url: var_or("USGS_INVENTORY_URL", DEFAULT_USGS_INVENTORY_URL),
                usgs_iv_url: var_or("USGS_IV_URL", DEFAULT_USGS_IV_URL),
                dwr_base_url: var_or("DWR_BASE_URL", DEFAULT_DWR_BASE_URL),
                snotel_base_url: var_or("SNOTEL_BASE_URL", DEFAULT_SNOTEL_BASE_URL),
                reservoir_base_url: var_or("RESERVOIR_BASE_URL", DEFAULT_RESERVOIR_BASE_URL),
                weather_base_url: var_or("WEATHER_BASE_URL", DEFAULT_WEATHER_BASE_URL),
            },
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
