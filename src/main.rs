use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use river_flow_service::app::Application;
use river_flow_service::config::Config;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,river_flow_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!(
        "Starting river flow service on {} (refresh every {} min, registry {})",
        config.server_addr(),
        config.refresh_interval_minutes,
        config.station_registry_path.display()
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await
}
