// Shared helpers for integration tests: an in-memory transport and upstream fixtures
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use river_flow_service::config::Endpoints;
use river_flow_service::favorites::{FavoritesStore, InMemoryFavoritesStore};
use river_flow_service::fetch_error::FetchError;
use river_flow_service::fetchers::Fetchers;
use river_flow_service::http_client::HttpTransport;
use river_flow_service::registry::StationRegistry;
use river_flow_service::services::RiverDataService;

pub const FAKE_BASE: &str = "http://upstream.test";

/// One canned response. A gated response waits until its `Notify` is fired.
#[derive(Clone)]
pub struct FakeResponse {
    body: Result<String, FetchError>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
}

impl FakeResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            body: Ok(body.into()),
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn err(error: FetchError) -> Self {
        Self {
            body: Err(error),
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

struct Route {
    pattern: String,
    responses: VecDeque<FakeResponse>,
}

/// Transport that answers from a routing table keyed by URL substring.
///
/// Each route hands out its queued responses in order and keeps repeating the last one.
/// Unrouted URLs fail with `RequestFailed`.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, response: FakeResponse) -> Self {
        self.push(pattern, response);
        self
    }

    pub fn push(&self, pattern: &str, response: FakeResponse) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                pattern: pattern.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(pattern)).count()
    }

    fn next_response(&self, url: &str) -> Option<FakeResponse> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.iter_mut().find(|r| url.contains(&r.pattern))?;
        if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        }
    }
}

impl HttpTransport for FakeTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        self.calls.lock().unwrap().push(url.to_string());
        let response = self.next_response(url);
        Box::pin(async move {
            let Some(response) = response else {
                return Err(FetchError::RequestFailed(format!("no fake route for {url}")));
            };
            if let Some(gate) = &response.gate {
                gate.notified().await;
            }
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }
            response.body
        })
    }
}

pub fn fetchers(transport: Arc<FakeTransport>, weather_api_key: Option<&str>) -> Fetchers {
    Fetchers::new(
        transport,
        &Endpoints::with_base_url(FAKE_BASE),
        weather_api_key.map(str::to_string),
    )
}

pub fn service_with(transport: Arc<FakeTransport>, favorites: Arc<dyn FavoritesStore>) -> RiverDataService {
    RiverDataService::new(
        fetchers(transport, Some("test-key")),
        StationRegistry::default(),
        favorites,
        Duration::from_secs(5),
    )
}

pub fn service(transport: Arc<FakeTransport>) -> RiverDataService {
    service_with(transport, Arc::new(InMemoryFavoritesStore::new()))
}

/// Transport with every list-level source answering from the fixtures below.
pub fn list_sources() -> FakeTransport {
    FakeTransport::new()
        .route("/usgs/current", FakeResponse::ok(CURRENT_CONDITIONS))
        .route("/usgs/inventory", FakeResponse::ok(STATE_INVENTORY))
        .route("/dwr/surfacewaterstations", FakeResponse::ok(DWR_STATIONS))
}

pub const RDB_HEADER: &str = "agency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdd_nu\tresult_dt\tresult_tz\tresult_va\tresult_cd\n5s\t15s\t50s\t7s\t10n\t16d\t6s\t14n\t3s\n";

pub const CURRENT_CONDITIONS: &str = "# US Geological Survey\n# Colorado current conditions\n# retrieved: 2024-04-18 11:02:17 EDT\nagency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdd_nu\tresult_dt\tresult_tz\tresult_va\tresult_cd\n5s\t15s\t50s\t7s\t10n\t16d\t6s\t14n\t3s\nUSGS\t09058000\tCOLORADO RIVER NEAR KREMMLING, CO\tST\t1\t2024-04-18 10:45\tMDT\t1250\tP\nUSGS\t07087050\tARKANSAS RIVER BELOW GRANITE, CO\tST\t1\t2024-04-18 10:30\tMDT\t480\tP\nUSGS\t07096000\tARKANSAS RIVER AT CANON CITY, CO\tST\t1\t2024-04-18 10:30\tMDT\tIce\t\n";

pub const STATE_INVENTORY: &str = "#\n# USGS site inventory\nagency_cd\tsite_no\tstation_nm\tsite_tp_cd\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t7s\t16s\t16s\nUSGS\t09058000\tCOLORADO RIVER NEAR KREMMLING, CO\tST\t40.0366\t-106.4395\nUSGS\t07087050\tARKANSAS RIVER BELOW GRANITE, CO\tST\t39.0425\t-106.2647\nUSGS\t06752000\tCACHE LA POUDRE RIV AT MO OF CN, NR FT COLLINS, CO\tST\t40.6647\t-105.2242\n";

pub const DWR_STATIONS: &str = r#"{
    "PageCount": 1,
    "ResultList": [
        {"stationNum": 1001, "abbrev": "ARKCANCO", "stationName": "ARKANSAS RIVER AT CANON CITY", "usgsSiteId": "07096000", "latitude": 38.434, "longitude": -105.256, "dataSource": "CODWR"},
        {"stationNum": 1002, "abbrev": "PLAKERCO", "stationName": "SOUTH PLATTE RIVER NEAR KERSEY", "usgsSiteId": null, "latitude": 40.41, "longitude": -104.56, "dataSource": "CO DWR"},
        {"stationNum": 1003, "abbrev": "CLAFTCCO", "stationName": "CACHE LA POUDRE AT FORT COLLINS", "dataSource": "USGS"}
    ]
}"#;

pub fn iv_series(rows: &[(&str, f64)]) -> String {
    let mut text = String::from(
        "# USGS instantaneous values\nagency_cd\tsite_no\tdatetime\ttz_cd\t69928_00060\t69928_00060_cd\n5s\t15s\t20d\t6s\t14n\t10s\n",
    );
    for (datetime, value) in rows {
        text.push_str(&format!("USGS\t09058000\t{datetime}\tMDT\t{value}\tP\n"));
    }
    text
}

pub const DWR_FLOW: &str = r#"{"ResultList": [
    {"abbrev": "PLAKERCO", "measDate": "2024-04-16", "value": 410.0, "measUnit": "cfs"},
    {"abbrev": "PLAKERCO", "measDate": "2024-04-17", "value": 436.0, "measUnit": "cfs"}
]}"#;

pub const SNOTEL_REPORT: &str = "#------------------------------------------------- WARNING --------------------------------------------\n# Provisional data, subject to revision.\nDate,Phantom Valley (1120) Snow Water Equivalent (in) Start of Day Values,Phantom Valley (1120) Snow Depth (in) Start of Day Values,Phantom Valley (1120) Snow Water Equivalent % of Median (1991-2020)\n2024-04-16,14.1,48,96\n2024-04-17,14.3,49,97\n";

pub fn reservoir_series(storage: f64) -> String {
    format!(r#"{{"columns": ["datetime", "storage"], "data": [["2024-04-15", 90000.0], ["2024-04-17", {storage}], ["2024-04-16", "95000"]]}}"#)
}

pub const WEATHER: &str = r#"{"main": {"temp": 51.3, "temp_min": 38.1, "temp_max": 58.6}, "name": "Kremmling"}"#;
