use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::models::{Agency, StationKey, USGS_SITE_PREFIX};
use crate::services::{RiverDataService, ServiceError, SourceStatus, StationView};
use crate::utils::split_station_name;

#[derive(Clone)]
pub struct AppState {
    pub service: RiverDataService,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub stations: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub search: String,
}

#[derive(Serialize)]
pub struct DisplayName {
    pub river: String,
    pub location: String,
    pub region: String,
}

#[derive(Serialize)]
pub struct StationResponse {
    #[serde(flatten)]
    pub station: StationView,
    pub display_name: DisplayName,
}

impl From<StationView> for StationResponse {
    fn from(station: StationView) -> Self {
        let (river, location, region) = split_station_name(&station.record.station_name);
        Self {
            station,
            display_name: DisplayName { river, location, region },
        }
    }
}

#[derive(Serialize)]
pub struct StationListResponse {
    pub total: usize,
    pub stations: Vec<StationResponse>,
}

impl From<Vec<StationView>> for StationListResponse {
    fn from(stations: Vec<StationView>) -> Self {
        Self {
            total: stations.len(),
            stations: stations.into_iter().map(StationResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct FavoriteResponse {
    pub station: String,
    pub is_favorite: bool,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub started: Vec<String>,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/stations", get(search_stations))
        .route("/stations/{agency}/{site_number}", get(get_station))
        .route("/stations/{agency}/{site_number}/favorite", post(toggle_favorite))
        .route("/stations/{agency}/{site_number}/refresh", post(refresh_station))
        .route("/favorites", get(get_favorites))
        .route("/map", get(get_map))
        .route("/sources", get(get_sources))
        .route("/refresh", post(refresh_all))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

/// USGS site numbers may be given bare or with their "USGS " prefix.
fn station_key(agency: &str, site_number: &str) -> Result<StationKey, StatusCode> {
    let agency: Agency = agency.parse().map_err(|e| {
        warn!("Rejecting station path: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let site = site_number.trim();
    let site = match agency {
        Agency::Usgs if !site.starts_with(USGS_SITE_PREFIX) => format!("{USGS_SITE_PREFIX}{site}"),
        _ => site.to_string(),
    };
    Ok(StationKey::new(agency, site))
}

fn service_status(e: &ServiceError) -> StatusCode {
    match e {
        ServiceError::UnknownStation(_) => StatusCode::NOT_FOUND,
        ServiceError::Favorites(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
        stations: state.service.snapshot().stations.len(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state), fields(search = %params.search))]
async fn search_stations(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<StationListResponse> {
    let stations = state.service.search(&params.search);
    info!("Search matched {} stations", stations.len());
    Json(stations.into())
}

#[instrument(skip(state))]
async fn get_station(
    State(state): State<AppState>,
    Path((agency, site_number)): Path<(String, String)>,
) -> Result<Json<StationResponse>, StatusCode> {
    let key = station_key(&agency, &site_number)?;
    let snapshot = state.service.snapshot();
    let station = snapshot.station(&key).cloned().ok_or_else(|| {
        warn!("Station {} not found", key);
        StatusCode::NOT_FOUND
    })?;
    Ok(Json(station.into()))
}

#[instrument(skip(state))]
async fn toggle_favorite(
    State(state): State<AppState>,
    Path((agency, site_number)): Path<(String, String)>,
) -> Result<Json<FavoriteResponse>, StatusCode> {
    let key = station_key(&agency, &site_number)?;
    let is_favorite = state.service.toggle_favorite(&key).await.map_err(|e| {
        error!("Failed to toggle favorite for {}: {}", key, e);
        service_status(&e)
    })?;
    Ok(Json(FavoriteResponse {
        station: key.to_string(),
        is_favorite,
    }))
}

#[instrument(skip(state))]
async fn refresh_station(
    State(state): State<AppState>,
    Path((agency, site_number)): Path<(String, String)>,
) -> Result<(StatusCode, Json<RefreshResponse>), StatusCode> {
    let key = station_key(&agency, &site_number)?;
    let handle = state.service.refresh_station(&key).await.map_err(|e| {
        warn!("Cannot refresh {}: {}", key, e);
        service_status(&e)
    })?;
    let started = handle.started().to_vec();
    Ok((StatusCode::ACCEPTED, Json(RefreshResponse { started })))
}

#[instrument(skip(state))]
async fn get_favorites(State(state): State<AppState>) -> Json<StationListResponse> {
    Json(state.service.favorites().into())
}

#[instrument(skip(state))]
async fn get_map(State(state): State<AppState>) -> Json<StationListResponse> {
    Json(state.service.mapped_stations().into())
}

#[instrument(skip(state))]
async fn get_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.service.sources())
}

#[instrument(skip(state))]
async fn refresh_all(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    let handle = state.service.refresh_all().await;
    let started = handle.started().to_vec();
    info!("Refresh requested, started {:?}", started);
    (StatusCode::ACCEPTED, Json(RefreshResponse { started }))
}
