use std::sync::Arc;

use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::favorites::{FavoritesStore, JsonFileFavoritesStore};
use crate::fetchers::Fetchers;
use crate::http_client::{HttpTransport, ReqwestTransport};
use crate::registry::StationRegistry;
use crate::scheduler;
use crate::services::RiverDataService;

/// Application with all spawned background tasks and server
pub struct Application {
    pub service: RiverDataService,
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub scheduler_handle: Option<JoinHandle<()>>,
}

impl Application {
    /// Build and initialize the application
    ///
    /// Loads the station registry and persisted favorites, creates the engine and spawns:
    /// - HTTP API server (Axum)
    /// - Refresh scheduler, unless the interval is 0 (then a single refresh runs at startup)
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let registry = StationRegistry::load_or_default(&config.station_registry_path)?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.fetch_timeout())?);
        let favorites: Arc<dyn FavoritesStore> = Arc::new(JsonFileFavoritesStore::new(&config.favorites_dir));

        if config.weather_api_key.is_none() {
            info!("WEATHER_API_KEY not set, weather fields stay unresolved");
        }

        let fetchers = Fetchers::new(transport, &config.endpoints, config.weather_api_key.clone());
        let service = RiverDataService::new(fetchers, registry, favorites, config.fetch_timeout());

        let scheduler_handle = if config.refresh_interval_minutes > 0 {
            let service = service.clone();
            let interval = config.refresh_interval_minutes;
            Some(tokio::spawn(async move {
                scheduler::start_refresh_scheduler(service, interval).await;
            }))
        } else {
            info!("Periodic refresh disabled, running one refresh at startup");
            service.refresh_all().await;
            None
        };

        let app_state = AppState {
            service: service.clone(),
        };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self {
            service,
            server_handle,
            scheduler_handle,
        })
    }

    /// Run until the server stops (which runs indefinitely unless error)
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
