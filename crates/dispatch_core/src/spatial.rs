//! Spatial operations: H3-based geographic indexing and the driver location
//! cache.
//!
//! This module provides:
//!
//! - **GeoPoint**: validated latitude/longitude pair used across records
//! - **Distance calculations**: haversine distance, with an LRU cache for
//!   cell-to-cell lookups
//! - **LocationStore**: swappable most-recent-location cache per driver,
//!   backed by an H3 cell index for radius queries
//!
//! Default resolution is 9 (~240m cell size), suitable for city-scale
//! dispatch areas. The cache is process-local and best-effort: it starts
//! empty on restart and repopulates as drivers reconnect and re-announce.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use bevy_ecs::prelude::Resource;
use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::ride::UserId;

pub const DEFAULT_RESOLUTION: Resolution = Resolution::Nine;

/// Average hexagon edge length at resolution 9, in km. Used to size the
/// grid-disk prefilter for a km radius; dividing by the edge overshoots the
/// ring count, so the exact haversine filter afterwards never misses.
const RES9_EDGE_KM: f64 = 0.174;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// H3 cell at [DEFAULT_RESOLUTION]; `None` for out-of-range coordinates.
    pub fn try_cell(&self) -> Option<CellIndex> {
        LatLng::new(self.lat, self.lng)
            .ok()
            .map(|ll| ll.to_cell(DEFAULT_RESOLUTION))
    }
}

/// Haversine distance between two points, in km.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    6371.0 * c
}

/// Uncached cell-to-cell distance (internal use).
fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    haversine_km(
        GeoPoint::new(a.lat(), a.lng()),
        GeoPoint::new(b.lat(), b.lng()),
    )
}

/// Global cell distance cache (50,000 entries).
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(50_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Calculate distance between two H3 cells with LRU caching.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    // Symmetric key (smaller cell first) to maximize cache hits
    let key = if a < b { (a, b) } else { (b, a) };

    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        // Fallback: compute without cache if mutex poisoned
        Err(_) => return distance_km_between_cells_uncached(key.0, key.1),
    };
    *cache.get_or_insert(key, || distance_km_between_cells_uncached(key.0, key.1))
}

/// Grid disk covering at least `radius_km` around `origin`.
fn covering_disk(origin: CellIndex, radius_km: f64) -> Vec<CellIndex> {
    let k = (radius_km / RES9_EDGE_KM).ceil().max(1.0) as u32;
    origin.grid_disk::<Vec<_>>(k)
}

/// Most recent known location of one driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverLocation {
    pub point: GeoPoint,
    pub cell: CellIndex,
    pub recorded_at: u64,
}

/// Swappable most-recent-location cache, keyed by driver.
///
/// Not a source of truth: a multi-process deployment can back this with a
/// shared cache without changing call sites.
pub trait LocationStore: Send + Sync {
    /// Latest-wins update. Returns `false` when the update is older than the
    /// cached entry and was dropped.
    fn update(&mut self, driver: UserId, location: DriverLocation) -> bool;

    fn get(&self, driver: UserId) -> Option<DriverLocation>;

    fn remove(&mut self, driver: UserId);

    /// Drivers within `radius_km` of `origin`, nearest first.
    fn nearby(&self, origin: GeoPoint, radius_km: f64) -> Vec<(UserId, f64)>;
}

/// In-memory [LocationStore] with an H3 cell index for radius queries.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    by_driver: HashMap<UserId, DriverLocation>,
    drivers_by_cell: HashMap<CellIndex, Vec<UserId>>,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&mut self, driver: UserId, cell: CellIndex) {
        if let Some(drivers) = self.drivers_by_cell.get_mut(&cell) {
            drivers.retain(|d| *d != driver);
            if drivers.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
    }
}

impl LocationStore for InMemoryLocationStore {
    fn update(&mut self, driver: UserId, location: DriverLocation) -> bool {
        if let Some(existing) = self.by_driver.get(&driver) {
            if location.recorded_at < existing.recorded_at {
                return false;
            }
            let old_cell = existing.cell;
            if old_cell != location.cell {
                self.unindex(driver, old_cell);
                self.drivers_by_cell
                    .entry(location.cell)
                    .or_default()
                    .push(driver);
            }
        } else {
            self.drivers_by_cell
                .entry(location.cell)
                .or_default()
                .push(driver);
        }
        self.by_driver.insert(driver, location);
        true
    }

    fn get(&self, driver: UserId) -> Option<DriverLocation> {
        self.by_driver.get(&driver).copied()
    }

    fn remove(&mut self, driver: UserId) {
        if let Some(location) = self.by_driver.remove(&driver) {
            self.unindex(driver, location.cell);
        }
    }

    fn nearby(&self, origin: GeoPoint, radius_km: f64) -> Vec<(UserId, f64)> {
        let Some(origin_cell) = origin.try_cell() else {
            return Vec::new();
        };
        let mut matches: Vec<(UserId, f64)> = Vec::new();
        for cell in covering_disk(origin_cell, radius_km) {
            let Some(drivers) = self.drivers_by_cell.get(&cell) else {
                continue;
            };
            for driver in drivers {
                let Some(location) = self.by_driver.get(driver) else {
                    continue;
                };
                let distance = distance_km_between_cells(origin_cell, location.cell);
                if distance <= radius_km {
                    matches.push((*driver, distance));
                }
            }
        }
        matches.sort_by(|a, b| a.1.total_cmp(&b.1));
        matches
    }
}

/// Resource wrapper for the location cache trait object.
#[derive(Resource)]
pub struct LocationCache(pub Box<dyn LocationStore>);

impl LocationCache {
    pub fn in_memory() -> Self {
        Self(Box::new(InMemoryLocationStore::new()))
    }
}

impl std::ops::Deref for LocationCache {
    type Target = dyn LocationStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for LocationCache {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(point: GeoPoint, recorded_at: u64) -> DriverLocation {
        DriverLocation {
            point,
            cell: point.try_cell().expect("valid point"),
            recorded_at,
        }
    }

    #[test]
    fn haversine_is_zero_for_identical_points() {
        let p = GeoPoint::new(52.52, 13.405);
        assert!(haversine_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn update_drops_older_timestamps() {
        let mut store = InMemoryLocationStore::new();
        let driver = UserId::new();
        let berlin = GeoPoint::new(52.52, 13.405);

        assert!(store.update(driver, located(berlin, 100)));
        assert!(!store.update(driver, located(GeoPoint::new(52.53, 13.41), 50)));
        assert_eq!(store.get(driver).expect("cached").recorded_at, 100);
        assert_eq!(store.get(driver).expect("cached").point, berlin);
    }

    #[test]
    fn nearby_orders_by_distance_and_respects_radius() {
        let mut store = InMemoryLocationStore::new();
        let origin = GeoPoint::new(52.52, 13.405);
        let near = UserId::new();
        let far = UserId::new();
        let out_of_range = UserId::new();

        store.update(near, located(GeoPoint::new(52.521, 13.406), 1));
        store.update(far, located(GeoPoint::new(52.55, 13.45), 1));
        // ~55 km away
        store.update(out_of_range, located(GeoPoint::new(53.0, 13.4), 1));

        let found = store.nearby(origin, 10.0);
        let ids: Vec<UserId> = found.iter().map(|(d, _)| *d).collect();
        assert_eq!(ids, vec![near, far]);
        assert!(found[0].1 < found[1].1);
    }

    #[test]
    fn remove_clears_the_cell_index() {
        let mut store = InMemoryLocationStore::new();
        let origin = GeoPoint::new(52.52, 13.405);
        let driver = UserId::new();

        store.update(driver, located(origin, 1));
        store.remove(driver);

        assert!(store.get(driver).is_none());
        assert!(store.nearby(origin, 10.0).is_empty());
    }
}
