use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::favorites::{FavoritesError, FavoritesStore};
use crate::fetch_error::FetchError;
use crate::fetchers::Fetchers;
use crate::models::{
    Agency, FlowReading, ReservoirSnapshot, SnowpackSnapshot, StationKey, StationRecord, WeatherSnapshot,
};
use crate::parsers::dwr::DwrStation;
use crate::parsers::usgs_current::CurrentConditionsRow;
use crate::parsers::usgs_inventory::SiteCoordinates;
use crate::parsers::Parsed;
use crate::registry::StationRegistry;
use crate::resolver::{FlowMerge, StationCollection};
use crate::services::field_group::{FieldGroup, FieldState};

/// How far back the DWR daily series is requested for a detail refresh.
pub const DWR_FLOW_LOOKBACK_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown station: {0}")]
    UnknownStation(String),

    #[error("Failed to persist favorites: {0}")]
    Favorites(#[from] FavoritesError),
}

/// The list-level upstreams a full refresh pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    UsgsCurrent,
    UsgsInventory,
    DwrStations,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::UsgsCurrent, SourceKind::UsgsInventory, SourceKind::DwrStations];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::UsgsCurrent => "usgs_current",
            SourceKind::UsgsInventory => "usgs_inventory",
            SourceKind::DwrStations => "dwr_stations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    #[default]
    Idle,
    Fetching {
        started_at: DateTime<Utc>,
    },
    Done {
        finished_at: DateTime<Utc>,
        records: usize,
        skipped: usize,
    },
    Failed {
        finished_at: DateTime<Utc>,
        error: String,
    },
}

impl SourceState {
    pub fn is_fetching(&self) -> bool {
        matches!(self, SourceState::Fetching { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: SourceKind,
    #[serde(flatten)]
    pub state: SourceState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldStates {
    pub flow: FieldState,
    pub snowpack: FieldState,
    pub reservoirs: FieldState,
    pub weather: FieldState,
}

/// One station as the display layer sees it: the record plus its detail fields.
#[derive(Debug, Clone, Serialize)]
pub struct StationView {
    #[serde(flatten)]
    pub record: StationRecord,
    pub snowpack: Option<SnowpackSnapshot>,
    pub reservoirs: Vec<ReservoirSnapshot>,
    pub weather: Option<WeatherSnapshot>,
    pub field_states: FieldStates,
    /// Error of the latest fetch per field group, for groups whose last fetch failed.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
}

/// Immutable view of the aggregate, published after every merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub stations: Vec<StationView>,
    pub sources: Vec<SourceStatus>,
}

impl Snapshot {
    pub fn station(&self, key: &StationKey) -> Option<&StationView> {
        self.stations
            .iter()
            .find(|s| s.record.agency == key.agency && s.record.site_number == key.site_number)
    }

    /// Case-insensitive substring match on the station name. A blank term matches everything.
    pub fn search(&self, term: &str) -> Vec<StationView> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.stations.clone();
        }
        self.stations
            .iter()
            .filter(|s| s.record.station_name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn favorites(&self) -> Vec<StationView> {
        self.stations.iter().filter(|s| s.record.is_favorite).cloned().collect()
    }

    pub fn mapped_stations(&self) -> Vec<StationView> {
        self.stations
            .iter()
            .filter(|s| s.record.coordinates.is_some())
            .cloned()
            .collect()
    }
}

/// Tasks started by a refresh. Dropping it leaves the tasks running.
#[derive(Debug)]
pub struct RefreshHandle {
    started: Vec<String>,
    handles: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Names of the fetches this refresh actually started.
    pub fn started(&self) -> &[String] {
        &self.started
    }

    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Refresh task panicked or was cancelled: {}", e);
            }
        }
    }
}

#[derive(Debug, Default)]
struct StationDetail {
    flow: FieldGroup<FlowReading>,
    snowpack: FieldGroup<SnowpackSnapshot>,
    reservoirs: FieldGroup<Vec<ReservoirSnapshot>>,
    weather: FieldGroup<WeatherSnapshot>,
}

impl StationDetail {
    fn errors(&self) -> BTreeMap<String, String> {
        [
            ("flow", self.flow.last_error()),
            ("snowpack", self.snowpack.last_error()),
            ("reservoirs", self.reservoirs.last_error()),
            ("weather", self.weather.last_error()),
        ]
        .into_iter()
        .filter_map(|(field, error)| error.map(|e| (field.to_string(), e.to_string())))
        .collect()
    }
}

enum SourceBatch {
    Current(Parsed<CurrentConditionsRow>),
    Coordinates(Parsed<SiteCoordinates>),
    Dwr(Parsed<DwrStation>),
}

#[derive(Default)]
struct EngineState {
    stations: StationCollection,
    details: HashMap<StationKey, StationDetail>,
    sources: BTreeMap<SourceKind, SourceState>,
    version: u64,
}

impl EngineState {
    fn merge_batch(&mut self, batch: SourceBatch, registry: &StationRegistry, now: DateTime<Utc>) -> (usize, usize) {
        match batch {
            SourceBatch::Current(parsed) => (
                self.stations.merge_current_conditions(&parsed.records, registry, now),
                parsed.skipped,
            ),
            SourceBatch::Coordinates(parsed) => {
                self.stations.merge_coordinates(&parsed.records, now);
                (parsed.records.len(), parsed.skipped)
            }
            SourceBatch::Dwr(parsed) => (
                self.stations.merge_dwr_stations(&parsed.records, registry, now),
                parsed.skipped,
            ),
        }
    }

    fn snapshot(&self) -> Snapshot {
        let stations = self
            .stations
            .records()
            .map(|record| {
                let detail = self.details.get(&record.key());
                let mut field_states = detail
                    .map(|d| FieldStates {
                        flow: d.flow.state(),
                        snowpack: d.snowpack.state(),
                        reservoirs: d.reservoirs.state(),
                        weather: d.weather.state(),
                    })
                    .unwrap_or_default();
                // Flow can also arrive through the list feeds, outside any ticket.
                if record.flow.is_some()
                    && matches!(field_states.flow, FieldState::Unresolved | FieldState::Failed)
                {
                    field_states.flow = FieldState::Resolved;
                }
                if record.flow.is_some() && field_states.flow == FieldState::Pending {
                    field_states.flow = FieldState::ResolvedStale;
                }

                StationView {
                    record: record.clone(),
                    snowpack: detail.and_then(|d| d.snowpack.value().cloned()),
                    reservoirs: detail
                        .and_then(|d| d.reservoirs.value().cloned())
                        .unwrap_or_default(),
                    weather: detail.and_then(|d| d.weather.value().copied()),
                    field_states,
                    field_errors: detail.map(StationDetail::errors).unwrap_or_default(),
                }
            })
            .collect();

        let sources = SourceKind::ALL
            .iter()
            .map(|source| SourceStatus {
                source: *source,
                state: self.sources.get(source).cloned().unwrap_or_default(),
            })
            .collect();

        Snapshot {
            version: self.version,
            stations,
            sources,
        }
    }

    fn favorite_records(&self) -> Vec<StationRecord> {
        self.stations.records().filter(|r| r.is_favorite).cloned().collect()
    }
}

struct Inner {
    fetchers: Fetchers,
    registry: StationRegistry,
    favorites: Arc<dyn FavoritesStore>,
    fetch_timeout: Duration,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
}

/// Owner of the canonical station collection.
///
/// Fetches run as independent tasks; every merge goes through one mutex and ends by
/// publishing a fresh [`Snapshot`], so readers never see a record mid-merge.
#[derive(Clone)]
pub struct RiverDataService {
    inner: Arc<Inner>,
}

impl RiverDataService {
    /// Builds the engine and merges persisted favorites before the first snapshot is published.
    pub fn new(
        fetchers: Fetchers,
        registry: StationRegistry,
        favorites: Arc<dyn FavoritesStore>,
        fetch_timeout: Duration,
    ) -> Self {
        let mut state = EngineState::default();
        let seeded = favorites.load();
        info!("Seeding {} favorite stations", seeded.len());
        for record in seeded {
            state.stations.seed_favorite(record);
        }

        let (snapshot_tx, _) = watch::channel(Arc::new(state.snapshot()));
        Self {
            inner: Arc::new(Inner {
                fetchers,
                registry,
                favorites,
                fetch_timeout,
                state: Mutex::new(state),
                snapshot_tx,
            }),
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.inner.registry
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Change feed of snapshots; each merge publishes a new one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    fn publish(&self, state: &mut EngineState) {
        state.version += 1;
        self.inner.snapshot_tx.send_replace(Arc::new(state.snapshot()));
    }

    async fn with_timeout<T>(&self, fetch: impl Future<Output = Result<T, FetchError>>) -> Result<T, FetchError> {
        with_timeout(self.inner.fetch_timeout, fetch).await
    }

    /// Starts every list-level source that is not already being fetched and returns
    /// immediately. Each source merges on its own as soon as it completes. Once the
    /// started sources have settled, detail fields are refreshed for every station the
    /// registry covers and every favorite; waiting on the handle covers those too.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> RefreshHandle {
        let mut state = self.inner.state.lock().await;
        let mut started = Vec::new();
        let mut sources = Vec::new();

        for source in SourceKind::ALL {
            if state.sources.get(&source).is_some_and(SourceState::is_fetching) {
                debug!(source = source.as_str(), "Fetch still in flight, not restarting");
                continue;
            }
            state.sources.insert(
                source,
                SourceState::Fetching {
                    started_at: Utc::now(),
                },
            );
            let service = self.clone();
            sources.push(tokio::spawn(async move { service.run_source(source).await }));
            started.push(source.as_str().to_string());
        }

        info!("Refresh started for {:?}", started);
        self.publish(&mut state);
        drop(state);

        if sources.is_empty() {
            return RefreshHandle {
                started,
                handles: Vec::new(),
            };
        }

        let service = self.clone();
        let details = tokio::spawn(async move {
            for handle in sources {
                if let Err(e) = handle.await {
                    error!("Source task panicked or was cancelled: {}", e);
                }
            }
            service.refresh_tracked_details().await.wait().await;
        });
        RefreshHandle {
            started,
            handles: vec![details],
        }
    }

    /// Starts detail fetches for registry-covered USGS gauges and favorites.
    /// USGS flow is left to the current-conditions feed.
    async fn refresh_tracked_details(&self) -> RefreshHandle {
        let mut state = self.inner.state.lock().await;
        let registry = &self.inner.registry;
        let tracked: Vec<StationRecord> = state
            .stations
            .records()
            .filter(|r| {
                r.is_favorite || (r.agency == Agency::Usgs && registry.by_usgs_site(r.bare_site_number()).is_some())
            })
            .cloned()
            .collect();

        let mut started = Vec::new();
        let mut handles = Vec::new();
        for record in &tracked {
            let details = self.start_details(&mut state, record, record.agency == Agency::Dwr);
            started.extend(details.started.iter().map(|field| format!("{}/{}", record.key(), field)));
            handles.extend(details.handles);
        }

        if !handles.is_empty() {
            info!(stations = tracked.len(), fetches = handles.len(), "Detail refresh started");
            self.publish(&mut state);
        }
        RefreshHandle { started, handles }
    }

    #[instrument(skip(self), fields(source = source.as_str()))]
    async fn run_source(&self, source: SourceKind) {
        let fetchers = &self.inner.fetchers;
        let outcome = match source {
            SourceKind::UsgsCurrent => self
                .with_timeout(fetchers.usgs.fetch_current_conditions())
                .await
                .map(SourceBatch::Current),
            SourceKind::UsgsInventory => self
                .with_timeout(fetchers.usgs.fetch_state_coordinates())
                .await
                .map(SourceBatch::Coordinates),
            SourceKind::DwrStations => self
                .with_timeout(fetchers.dwr.fetch_stations())
                .await
                .map(SourceBatch::Dwr),
        };

        let mut state = self.inner.state.lock().await;
        let now = Utc::now();
        let next = match outcome {
            Ok(batch) => {
                let (records, skipped) = state.merge_batch(batch, &self.inner.registry, now);
                info!(records, skipped, "Merged source");
                SourceState::Done {
                    finished_at: now,
                    records,
                    skipped,
                }
            }
            Err(e) => {
                warn!("Source fetch failed: {}", e);
                SourceState::Failed {
                    finished_at: now,
                    error: e.to_string(),
                }
            }
        };
        state.sources.insert(source, next);
        self.publish(&mut state);
    }

    /// Stores a flow reading unless the station already holds a newer one.
    #[instrument(skip(self, reading), fields(station = %key))]
    pub async fn merge_flow(&self, key: &StationKey, reading: FlowReading) -> FlowMerge {
        let mut state = self.inner.state.lock().await;
        let result = state.stations.merge_flow(key, reading, Utc::now());
        if result == FlowMerge::Applied {
            self.publish(&mut state);
        } else {
            debug!("Flow not merged: {:?}", result);
        }
        result
    }

    /// Flips the favorite flag and persists the full favorites set before returning.
    /// The flag is restored if persisting fails.
    #[instrument(skip(self), fields(station = %key))]
    pub async fn toggle_favorite(&self, key: &StationKey) -> Result<bool, ServiceError> {
        let mut state = self.inner.state.lock().await;
        let is_favorite = {
            let record = state
                .stations
                .get_mut(key)
                .ok_or_else(|| ServiceError::UnknownStation(key.to_string()))?;
            record.is_favorite = !record.is_favorite;
            record.is_favorite
        };

        // The store does blocking file I/O; the lock stays held so saves land in toggle order.
        let store = Arc::clone(&self.inner.favorites);
        let records = state.favorite_records();
        let saved = tokio::task::spawn_blocking(move || store.save(&records))
            .await
            .unwrap_or_else(|e| Err(FavoritesError::Task(e.to_string())));

        if let Err(e) = saved {
            error!("Could not persist favorites: {}", e);
            if let Some(record) = state.stations.get_mut(key) {
                record.is_favorite = !is_favorite;
            }
            return Err(e.into());
        }

        info!(is_favorite, "Favorite toggled");
        self.publish(&mut state);
        Ok(is_favorite)
    }

    pub fn search(&self, term: &str) -> Vec<StationView> {
        self.snapshot().search(term)
    }

    pub fn favorites(&self) -> Vec<StationView> {
        self.snapshot().favorites()
    }

    pub fn mapped_stations(&self) -> Vec<StationView> {
        self.snapshot().mapped_stations()
    }

    pub fn sources(&self) -> Vec<SourceStatus> {
        self.snapshot().sources.clone()
    }

    /// Refreshes the detail fields of one station: latest flow, snowpack, reservoirs
    /// and weather, each as its own ticketed fetch. A USGS gauge without coordinates
    /// also gets a single-site coordinate lookup. Fields with nothing to fetch (no
    /// SNOTEL id, no reservoirs, no weather key or location) are left alone.
    #[instrument(skip(self), fields(station = %key))]
    pub async fn refresh_station(&self, key: &StationKey) -> Result<RefreshHandle, ServiceError> {
        let mut state = self.inner.state.lock().await;
        let record = state
            .stations
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownStation(key.to_string()))?;

        let handle = self.start_details(&mut state, &record, true);
        self.publish(&mut state);
        Ok(handle)
    }

    fn start_details(&self, state: &mut EngineState, record: &StationRecord, with_flow: bool) -> RefreshHandle {
        let key = record.key();
        let river = self.inner.registry.by_usgs_site(record.bare_site_number()).cloned();
        let fetchers = self.inner.fetchers.clone();
        let detail = state.details.entry(key.clone()).or_default();

        let mut started = Vec::new();
        let mut handles = Vec::new();

        if with_flow {
            let flow_ticket = detail.flow.issue();
            let flow_fetch = {
                let fetchers = fetchers.clone();
                let record = record.clone();
                async move {
                    match record.agency {
                        Agency::Usgs => fetchers
                            .usgs
                            .fetch_latest_flow(&record.site_number)
                            .await
                            .map(|latest| latest.reading),
                        Agency::Dwr => {
                            let since = Utc::now().date_naive() - chrono::Duration::days(DWR_FLOW_LOOKBACK_DAYS);
                            fetchers
                                .dwr
                                .fetch_latest_flow(&record.site_number, since)
                                .await
                                .map(|point| point.reading)
                        }
                    }
                }
            };
            let flow_key = key.clone();
            handles.push(self.spawn_detail("flow", flow_fetch, move |state, result| {
                let detail = state.details.entry(flow_key.clone()).or_default();
                match result {
                    Ok(reading) => {
                        if detail.flow.apply(flow_ticket, reading) {
                            state.stations.merge_flow(&flow_key, reading, Utc::now());
                        } else {
                            debug!("Dropping superseded flow response");
                        }
                    }
                    Err(e) => {
                        warn!("Flow fetch failed: {}", e);
                        detail.flow.fail(flow_ticket, e.to_string());
                    }
                }
            }));
            started.push("flow".to_string());
        }

        if record.agency == Agency::Usgs && record.coordinates.is_none() {
            let usgs = fetchers.usgs.clone();
            let site_number = record.site_number.clone();
            let fetch = async move { usgs.fetch_site_coordinates(&site_number).await };
            handles.push(self.spawn_detail("coordinates", fetch, move |state, result| match result {
                Ok(site) => {
                    state.stations.merge_coordinates(&[site], Utc::now());
                }
                Err(e) => warn!("Coordinate lookup failed: {}", e),
            }));
            started.push("coordinates".to_string());
        }

        if let Some(snotel_id) = record.snotel_station_id.clone() {
            let snotel_state = river
                .as_ref()
                .map(|r| r.snotel_state.clone())
                .unwrap_or_else(|| "CO".to_string());
            let ticket = detail.snowpack.issue();
            let snotel = fetchers.snotel.clone();
            let fetch = async move { snotel.fetch_snowpack(&snotel_id, &snotel_state).await };
            let key = key.clone();
            handles.push(self.spawn_detail("snowpack", fetch, move |state, result| {
                let detail = state.details.entry(key).or_default();
                match result {
                    Ok(snowpack) => {
                        if !detail.snowpack.apply(ticket, snowpack) {
                            debug!("Dropping superseded snowpack response");
                        }
                    }
                    Err(e) => {
                        warn!("Snowpack fetch failed: {}", e);
                        detail.snowpack.fail(ticket, e.to_string());
                    }
                }
            }));
            started.push("snowpack".to_string());
        }

        if !record.reservoir_site_ids.is_empty() {
            let ticket = detail.reservoirs.issue();
            let reservoirs = fetchers.reservoirs.clone();
            let site_ids = record.reservoir_site_ids.clone();
            let fetch = async move { fetch_reservoirs(&reservoirs, &site_ids).await };
            let key = key.clone();
            handles.push(self.spawn_detail("reservoirs", fetch, move |state, result| {
                let detail = state.details.entry(key).or_default();
                match result {
                    Ok(snapshots) => {
                        if !detail.reservoirs.apply(ticket, snapshots) {
                            debug!("Dropping superseded reservoir response");
                        }
                    }
                    Err(e) => {
                        warn!("Reservoir fetch failed: {}", e);
                        detail.reservoirs.fail(ticket, e.to_string());
                    }
                }
            }));
            started.push("reservoirs".to_string());
        }

        let weather_point = record
            .coordinates
            .or_else(|| river.as_ref().and_then(|r| r.weather_point()));
        match weather_point {
            Some(point) if fetchers.weather.is_configured() => {
                let ticket = detail.weather.issue();
                let weather = fetchers.weather.clone();
                let fetch = async move { weather.fetch_weather(point).await };
                handles.push(self.spawn_detail("weather", fetch, move |state, result| {
                    let detail = state.details.entry(key).or_default();
                    match result {
                        Ok(weather) => {
                            if !detail.weather.apply(ticket, weather) {
                                debug!("Dropping superseded weather response");
                            }
                        }
                        Err(e) => {
                            warn!("Weather fetch failed: {}", e);
                            detail.weather.fail(ticket, e.to_string());
                        }
                    }
                }));
                started.push("weather".to_string());
            }
            _ => debug!("Skipping weather: no API key or no location"),
        }

        RefreshHandle { started, handles }
    }

    fn spawn_detail<T, Fut, F>(&self, field: &'static str, fetch: Fut, apply: F) -> JoinHandle<()>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        F: FnOnce(&mut EngineState, Result<T, FetchError>) + Send + 'static,
    {
        let service = self.clone();
        tokio::spawn(async move {
            let result = service.with_timeout(fetch).await;
            let mut state = service.inner.state.lock().await;
            debug!(field, ok = result.is_ok(), "Detail fetch finished");
            apply(&mut state, result);
            service.publish(&mut state);
        })
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fetch: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(limit, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::RequestFailed(format!("timed out after {}s", limit.as_secs_f64()))),
    }
}

/// Fetches every reservoir concurrently. Individual failures are logged and left out;
/// the group only fails when none of them succeed.
async fn fetch_reservoirs(
    fetcher: &crate::fetchers::ReservoirFetcher,
    site_ids: &[u32],
) -> Result<Vec<ReservoirSnapshot>, FetchError> {
    let results = join_all(site_ids.iter().map(|id| fetcher.fetch_reservoir(*id))).await;
    let mut snapshots = Vec::new();
    let mut last_error = None;
    for (site_id, result) in site_ids.iter().zip(results) {
        match result {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                warn!("Reservoir {} failed: {}", site_id, e);
                last_error = Some(e);
            }
        }
    }
    match (snapshots.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(snapshots),
    }
}
