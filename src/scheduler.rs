use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::services::{RiverDataService, SourceState};

/// Runs `refresh_all` every `interval_minutes`, starting immediately.
///
/// Each tick waits for the sources it started so the log reflects the outcome;
/// sources still in flight from a manual refresh are skipped by the engine.
#[instrument(skip(service), fields(interval_minutes = %interval_minutes))]
pub async fn start_refresh_scheduler(service: RiverDataService, interval_minutes: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes.max(1) * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Refresh scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - initiating refresh");
        refresh_and_report(&service).await;
    }
}

#[instrument(skip(service))]
async fn refresh_and_report(service: &RiverDataService) {
    let handle = service.refresh_all().await;
    if handle.started().is_empty() {
        debug!("Every source is still in flight, nothing started");
        return;
    }
    handle.wait().await;

    let snapshot = service.snapshot();
    for status in &snapshot.sources {
        match &status.state {
            SourceState::Done { records, skipped, .. } => {
                info!("{}: merged {} records ({} skipped)", status.source.as_str(), records, skipped)
            }
            SourceState::Failed { error, .. } => warn!("{}: failed: {}", status.source.as_str(), error),
            _ => {}
        }
    }
    info!("Refresh complete, {} stations known", snapshot.stations.len());
}
