// Fetcher tests over real HTTP: ReqwestTransport against a mockito server
// Uses mockito for HTTP mocking

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use mockito::{Matcher, Server, ServerGuard};

use common::*;
use river_flow_service::config::Endpoints;
use river_flow_service::fetch_error::FetchError;
use river_flow_service::fetchers::Fetchers;
use river_flow_service::http_client::ReqwestTransport;
use river_flow_service::models::Coordinates;

fn create_test_fetchers(server: &ServerGuard, weather_api_key: Option<&str>) -> Fetchers {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    Fetchers::new(
        Arc::new(transport),
        &Endpoints::with_base_url(&server.url()),
        weather_api_key.map(str::to_string),
    )
}

#[tokio::test]
async fn test_current_conditions_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/usgs/current")
        .match_query(Matcher::UrlEncoded("format".into(), "rdb".into()))
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body(CURRENT_CONDITIONS)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let parsed = fetchers.usgs.fetch_current_conditions().await.unwrap();

    assert_eq!(parsed.records.len(), 3);
    assert_eq!(parsed.skipped, 0);
    assert_eq!(parsed.records[0].site_number, "USGS 09058000");
    assert_eq!(parsed.records[0].flow.unwrap().value_cfs, 1250.0);
    // "Ice" keeps the row but carries no flow
    assert!(parsed.records[2].flow.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_state_inventory_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/usgs/inventory")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state_cd".into(), "co".into()),
            Matcher::UrlEncoded("site_tp_cd".into(), "ST".into()),
        ]))
        .with_status(200)
        .with_body(STATE_INVENTORY)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let parsed = fetchers.usgs.fetch_state_coordinates().await.unwrap();

    assert_eq!(parsed.records.len(), 3);
    let kremmling = parsed.records.iter().find(|s| s.site_number == "09058000").unwrap();
    assert_eq!(kremmling.coordinates.latitude, 40.0366);
    assert_eq!(kremmling.coordinates.longitude, -106.4395);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_site_coordinates_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/usgs/inventory")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("search_site_no".into(), "07087050".into()),
            Matcher::UrlEncoded("search_site_no_match_type".into(), "exact".into()),
        ]))
        .with_status(200)
        .with_body("# inventory\nagency_cd\tsite_no\tstation_nm\tdec_lat_va\tdec_long_va\n5s\t15s\t50s\t16s\t16s\nUSGS\t07087050\tARKANSAS RIVER BELOW GRANITE, CO\t39.0425\t-106.2647\n")
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let site = fetchers.usgs.fetch_site_coordinates("USGS 07087050").await.unwrap();

    assert_eq!(site.site_number, "07087050");
    assert_eq!(site.station_name, "ARKANSAS RIVER BELOW GRANITE, CO");
    assert_eq!(site.coordinates.latitude, 39.0425);
    assert_eq!(site.coordinates.longitude, -106.2647);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_latest_flow_over_http() {
    let mut server = Server::new_async().await;
    let body = iv_series(&[
        ("2024-04-18 11:15", 1280.0),
        ("2024-04-18 11:30", 1300.0),
        ("2024-04-18 11:00", 1270.0),
    ]);
    let mock = server
        .mock("GET", "/usgs/iv")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("sites".into(), "09058000".into()),
            Matcher::UrlEncoded("parameterCd".into(), "00060".into()),
            Matcher::UrlEncoded("period".into(), "P1D".into()),
        ]))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let latest = fetchers.usgs.fetch_latest_flow("USGS 09058000").await.unwrap();

    assert_eq!(latest.reading.value_cfs, 1300.0);
    assert_eq!(
        latest.reading.measured_at,
        Utc.with_ymd_and_hms(2024, 4, 18, 17, 30, 0).unwrap()
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn test_latest_flow_rejects_non_numeric_site_without_request() {
    let server = Server::new_async().await;
    let fetchers = create_test_fetchers(&server, None);

    let err = fetchers.usgs.fetch_latest_flow("ARKCANCO").await.unwrap_err();
    assert_eq!(err, FetchError::InvalidSiteId("ARKCANCO".to_string()));
}

#[tokio::test]
async fn test_dwr_stations_and_flow_over_http() {
    let mut server = Server::new_async().await;
    let stations = server
        .mock("GET", "/dwr/surfacewaterstations/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(DWR_STATIONS)
        .create_async()
        .await;
    let flow = server
        .mock("GET", "/dwr/surfacewatertsday/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("abbrev".into(), "PLAKERCO".into()),
            Matcher::UrlEncoded("min-measDate".into(), "04/11/2024".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(DWR_FLOW)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);

    let parsed = fetchers.dwr.fetch_stations().await.unwrap();
    let abbrevs: Vec<&str> = parsed.records.iter().map(|s| s.abbrev.as_str()).collect();
    assert_eq!(abbrevs, vec!["ARKCANCO", "PLAKERCO"]);
    assert_eq!(parsed.records[0].usgs_site_id.as_deref(), Some("07096000"));

    let since = NaiveDate::from_ymd_opt(2024, 4, 11).unwrap();
    let point = fetchers.dwr.fetch_latest_flow("PLAKERCO", since).await.unwrap();
    assert_eq!(point.reading.value_cfs, 436.0);

    stations.assert_async().await;
    flow.assert_async().await;
}

#[tokio::test]
async fn test_snotel_report_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/snotel/1120:CO:SNTL".to_string()))
        .with_status(200)
        .with_body(SNOTEL_REPORT)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let snowpack = fetchers.snotel.fetch_snowpack("1120", "co").await.unwrap();

    assert_eq!(snowpack.station_name, "Phantom Valley");
    assert_eq!(snowpack.snow_water_equivalent_in, 14.3);
    assert_eq!(snowpack.report_date, NaiveDate::from_ymd_opt(2024, 4, 17).unwrap());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_reservoir_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/reservoirs/2005/json/17.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(reservoir_series(48_500.0))
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let reservoir = fetchers.reservoirs.fetch_reservoir(2005).await.unwrap();

    assert_eq!(reservoir.reservoir_name, "Williams Fork Reservoir");
    assert!((reservoir.percentage_filled - 50.0).abs() < 1e-9);
    assert_eq!(
        reservoir.latest().unwrap().date,
        NaiveDate::from_ymd_opt(2024, 4, 17).unwrap()
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_reservoir_never_hits_the_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let err = fetchers.reservoirs.fetch_reservoir(424242).await.unwrap_err();

    assert_eq!(err, FetchError::InvalidSiteId("424242".to_string()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_weather_over_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/weather")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("units".into(), "imperial".into()),
            Matcher::UrlEncoded("appid".into(), "secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(WEATHER)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, Some("secret"));
    let weather = fetchers
        .weather
        .fetch_weather(Coordinates {
            latitude: 40.0366,
            longitude: -106.4395,
        })
        .await
        .unwrap();

    assert_eq!(weather.high_temperature_f, 58.6);
    assert_eq!(weather.low_temperature_f, 38.1);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_weather_without_key_fails_before_request() {
    let server = Server::new_async().await;
    let fetchers = create_test_fetchers(&server, None);

    assert!(!fetchers.weather.is_configured());
    let err = fetchers
        .weather
        .fetch_weather(Coordinates {
            latitude: 40.0,
            longitude: -106.0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl(_)));
}

#[tokio::test]
async fn test_server_error_is_request_failed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/usgs/current")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let err = fetchers.usgs.fetch_current_conditions().await.unwrap_err();

    match err {
        FetchError::RequestFailed(msg) => assert!(msg.contains("500")),
        other => panic!("Expected RequestFailed, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_body_is_no_data() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/dwr/surfacewaterstations/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("   \n")
        .create_async()
        .await;

    let fetchers = create_test_fetchers(&server, None);
    let err = fetchers.dwr.fetch_stations().await.unwrap_err();

    assert_eq!(err, FetchError::NoData);
    mock.assert_async().await;
}
