use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use river_flow_service::config::Config;
use river_flow_service::favorites::{FavoritesStore, InMemoryFavoritesStore, JsonFileFavoritesStore};
use river_flow_service::fetchers::Fetchers;
use river_flow_service::http_client::{HttpTransport, ReqwestTransport};
use river_flow_service::models::{Agency, StationKey, USGS_SITE_PREFIX};
use river_flow_service::registry::StationRegistry;
use river_flow_service::services::{RiverDataService, SourceState, StationView};
use river_flow_service::utils::split_station_name;

#[derive(Parser)]
#[command(name = "river-snapshot")]
#[command(about = "Refresh every source once and print the merged station list", long_about = None)]
struct Cli {
    /// Only print stations whose name contains this text
    #[arg(long, default_value = "")]
    search: String,

    /// Also refresh flow, snowpack, reservoirs and weather for one station (e.g. USGS/09058000)
    #[arg(long)]
    station: Option<String>,

    /// Only print favorite stations
    #[arg(long)]
    favorites: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Ignore the favorites file
    #[arg(long)]
    no_favorites: bool,
}

fn parse_station(value: &str) -> Result<StationKey, Box<dyn std::error::Error>> {
    let (agency, site) = value
        .split_once('/')
        .ok_or_else(|| format!("expected AGENCY/SITE, got '{value}'"))?;
    let agency: Agency = agency.parse()?;
    let site = match agency {
        Agency::Usgs if !site.starts_with(USGS_SITE_PREFIX) => format!("{USGS_SITE_PREFIX}{site}"),
        _ => site.to_string(),
    };
    Ok(StationKey::new(agency, site))
}

fn print_station(view: &StationView) {
    let (river, location, region) = split_station_name(&view.record.station_name);
    let flow = view
        .record
        .flow
        .map(|f| format!("{:>9.1} cfs", f.value_cfs))
        .unwrap_or_else(|| "        fetching…".to_string());
    println!(
        "{:<5} {:<16} {} {:<32} {:<32} {:<2}{}",
        view.record.agency,
        view.record.site_number,
        flow,
        river,
        location,
        region,
        if view.record.is_favorite { " *" } else { "" }
    );
    if let Some(snowpack) = &view.snowpack {
        println!(
            "      snowpack {} ({}): {} in SWE on {}",
            snowpack.station_name, snowpack.station_id, snowpack.snow_water_equivalent_in, snowpack.report_date
        );
    }
    for reservoir in &view.reservoirs {
        println!(
            "      reservoir {}: {:.1}% full",
            reservoir.reservoir_name, reservoir.percentage_filled
        );
    }
    if let Some(weather) = &view.weather {
        println!(
            "      weather: high {}°F, low {}°F",
            weather.high_temperature_f, weather.low_temperature_f
        );
    }
    for (field, error) in &view.field_errors {
        println!("      {field} failed: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();
    let config = Config::from_env();

    let registry = StationRegistry::load_or_default(&config.station_registry_path)?;
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.fetch_timeout())?);
    let favorites: Arc<dyn FavoritesStore> = if cli.no_favorites {
        Arc::new(InMemoryFavoritesStore::new())
    } else {
        Arc::new(JsonFileFavoritesStore::new(&config.favorites_dir))
    };
    let fetchers = Fetchers::new(transport, &config.endpoints, config.weather_api_key.clone());
    let service = RiverDataService::new(fetchers, registry, favorites, config.fetch_timeout());

    service.refresh_all().await.wait().await;

    if let Some(station) = &cli.station {
        let key = parse_station(station)?;
        service.refresh_station(&key).await?.wait().await;
    }

    let stations = if cli.favorites {
        service
            .search(&cli.search)
            .into_iter()
            .filter(|s| s.record.is_favorite)
            .collect()
    } else {
        service.search(&cli.search)
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stations)?);
        return Ok(());
    }

    for status in service.sources() {
        match status.state {
            SourceState::Done { records, skipped, .. } => {
                eprintln!("{}: {} records, {} skipped", status.source.as_str(), records, skipped)
            }
            SourceState::Failed { error, .. } => eprintln!("{}: FAILED {}", status.source.as_str(), error),
            other => eprintln!("{}: {:?}", status.source.as_str(), other),
        }
    }
    for view in &stations {
        print_station(view);
    }
    println!("\n{} stations", stations.len());
    Ok(())
}
