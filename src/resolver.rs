//! Station identity resolution.
//!
//! Every parsed record is matched to a [`StationRecord`] by exact `(agency, site number)`.
//! Cross-agency links use exact equality on DWR's `usgsSiteId`. Inventory coordinates,
//! keyed by bare site number, join to any record whose site number ends with it.
//! Records are never removed.
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::models::{Agency, Coordinates, FlowReading, StationKey, StationRecord, USGS_SITE_PREFIX};
use crate::parsers::dwr::DwrStation;
use crate::parsers::usgs_current::CurrentConditionsRow;
use crate::parsers::usgs_inventory::SiteCoordinates;
use crate::registry::StationRegistry;

/// Outcome of a timestamp-guarded flow merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMerge {
    Applied,
    /// Incoming reading is older than the stored one and was discarded.
    Stale,
    UnknownStation,
}

/// The canonical station collection plus the indexes used to join late-arriving data.
#[derive(Debug, Clone, Default)]
pub struct StationCollection {
    stations: BTreeMap<StationKey, StationRecord>,
    /// Inventory coordinates by bare site number, kept for stations not created yet.
    pending_coordinates: HashMap<String, Coordinates>,
    /// DWR stations by the USGS site number they cross-reference.
    dwr_by_usgs_site: HashMap<String, StationKey>,
}

impl StationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, key: &StationKey) -> Option<&StationRecord> {
        self.stations.get(key)
    }

    pub fn get_mut(&mut self, key: &StationKey) -> Option<&mut StationRecord> {
        self.stations.get_mut(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.values()
    }

    /// Exact `(agency, site number)` lookup, creating the record when it is new.
    /// A new record picks up pending coordinates. Registry crosswalk fields are filled
    /// in whenever the record lacks them, which covers favorites seeded from storage.
    pub fn find_or_create(&mut self, key: StationKey, station_name: &str, registry: &StationRegistry) -> &mut StationRecord {
        let name = station_name.trim();
        match self.stations.entry(key) {
            Entry::Occupied(slot) => {
                let record = slot.into_mut();
                if record.station_name.is_empty() && !name.is_empty() {
                    record.station_name = name.to_string();
                }
                attach_registry(registry, record);
                record
            }
            Entry::Vacant(slot) => {
                let key = slot.key();
                let mut record = StationRecord::new(key.agency, key.site_number.clone(), name);
                attach_pending_coordinates(&self.pending_coordinates, &mut record);
                attach_registry(registry, &mut record);
                debug!("Created station {}", key);
                slot.insert(record)
            }
        }
    }

    /// Links a USGS record to the DWR station already pointing at it, if any.
    fn adopt_dwr_link(&mut self, usgs_key: &StationKey) {
        let bare = usgs_key
            .site_number
            .strip_prefix(USGS_SITE_PREFIX)
            .unwrap_or(&usgs_key.site_number)
            .to_string();
        if let Some(dwr_key) = self.dwr_by_usgs_site.get(&bare).cloned() {
            self.link(&dwr_key, &bare);
        }
    }

    /// Stores `reading` unless the record already holds a strictly newer one.
    /// Equal timestamps re-apply, so retries are idempotent.
    pub fn merge_flow(&mut self, key: &StationKey, reading: FlowReading, fetched_at: DateTime<Utc>) -> FlowMerge {
        let Some(record) = self.stations.get_mut(key) else {
            return FlowMerge::UnknownStation;
        };
        apply_flow(record, reading, fetched_at)
    }

    /// Merges the state-wide current-conditions report. Returns how many rows were merged.
    #[instrument(skip(self, rows, registry), fields(rows = rows.len()))]
    pub fn merge_current_conditions(
        &mut self,
        rows: &[CurrentConditionsRow],
        registry: &StationRegistry,
        fetched_at: DateTime<Utc>,
    ) -> usize {
        let mut stale = 0;
        for row in rows {
            let key = StationKey::new(Agency::Usgs, row.site_number.clone());
            let record = self.find_or_create(key.clone(), &row.station_name, registry);
            record.last_fetched_at = Some(fetched_at);
            if let Some(reading) = row.flow {
                if apply_flow(record, reading, fetched_at) == FlowMerge::Stale {
                    stale += 1;
                }
            }
            self.adopt_dwr_link(&key);
        }
        if stale > 0 {
            debug!("Kept newer stored flow for {} stations", stale);
        }
        rows.len()
    }

    /// Suffix-joins inventory coordinates onto existing records and remembers them
    /// for records created later. Returns the number of records updated.
    #[instrument(skip(self, sites), fields(sites = sites.len()))]
    pub fn merge_coordinates(&mut self, sites: &[SiteCoordinates], fetched_at: DateTime<Utc>) -> usize {
        let mut updated = 0;
        for site in sites {
            if site.site_number.is_empty() {
                continue;
            }
            self.pending_coordinates.insert(site.site_number.clone(), site.coordinates);
            for record in self.stations.values_mut() {
                if record.site_number.ends_with(&site.site_number) {
                    record.coordinates = Some(site.coordinates);
                    record.last_fetched_at = Some(fetched_at);
                    updated += 1;
                }
            }
        }
        debug!("Applied coordinates to {} stations", updated);
        updated
    }

    /// Merges the DWR station list and links each station to its USGS counterpart.
    #[instrument(skip(self, stations, registry), fields(stations = stations.len()))]
    pub fn merge_dwr_stations(
        &mut self,
        stations: &[DwrStation],
        registry: &StationRegistry,
        fetched_at: DateTime<Utc>,
    ) -> usize {
        let mut linked = 0;
        for station in stations {
            let key = StationKey::new(Agency::Dwr, station.abbrev.clone());
            let record = self.find_or_create(key.clone(), &station.station_name, registry);
            record.last_fetched_at = Some(fetched_at);
            if station.coordinates.is_some() {
                record.coordinates = station.coordinates;
            }
            record.usgs_site_id = station.usgs_site_id.clone();

            if let Some(usgs_site) = station.usgs_site_id.as_deref() {
                if self.link(&key, usgs_site) {
                    linked += 1;
                }
            }
        }
        debug!("Linked {} DWR stations to USGS records", linked);
        stations.len()
    }

    fn link(&mut self, dwr_key: &StationKey, usgs_site: &str) -> bool {
        self.dwr_by_usgs_site.insert(usgs_site.to_string(), dwr_key.clone());

        let usgs_key = StationKey::new(Agency::Usgs, format!("{USGS_SITE_PREFIX}{usgs_site}"));
        let dwr_coordinates = self.stations.get(dwr_key).and_then(|r| r.coordinates);
        let Some(usgs) = self.stations.get_mut(&usgs_key) else {
            return false;
        };
        usgs.linked_station = Some(dwr_key.clone());
        if usgs.coordinates.is_none() {
            usgs.coordinates = dwr_coordinates;
        }
        if let Some(dwr) = self.stations.get_mut(dwr_key) {
            dwr.linked_station = Some(usgs_key);
        }
        true
    }

    /// Inserts a persisted favorite, or flags the existing record with the same key.
    pub fn seed_favorite(&mut self, favorite: StationRecord) {
        let key = favorite.key();
        match self.stations.get_mut(&key) {
            Some(existing) => existing.is_favorite = true,
            None => {
                let mut record = favorite;
                record.is_favorite = true;
                self.stations.insert(key, record);
            }
        }
    }
}

fn attach_pending_coordinates(pending_coordinates: &HashMap<String, Coordinates>, record: &mut StationRecord) {
    if let Some(coordinates) = pending_coordinates
        .iter()
        .find(|(bare, _)| record.site_number.ends_with(bare.as_str()))
        .map(|(_, c)| *c)
    {
        record.coordinates = Some(coordinates);
    }
}

fn attach_registry(registry: &StationRegistry, record: &mut StationRecord) {
    if record.agency != Agency::Usgs {
        return;
    }
    if let Some(river) = registry.by_usgs_site(record.bare_site_number()) {
        if record.snotel_station_id.is_none() {
            record.snotel_station_id = river.snotel_station_id.clone();
        }
        if record.reservoir_site_ids.is_empty() {
            record.reservoir_site_ids = river.reservoir_site_ids.clone();
        }
    }
}

fn apply_flow(record: &mut StationRecord, reading: FlowReading, fetched_at: DateTime<Utc>) -> FlowMerge {
    if let Some(current) = record.flow {
        if reading.measured_at < current.measured_at {
            return FlowMerge::Stale;
        }
    }
    record.flow = Some(reading);
    record.last_fetched_at = Some(fetched_at);
    FlowMerge::Applied
}
