//! Region store: typed client over the monitoring engine
//!
//! Every operation is one synchronous request/response against the engine.
//! The store deals in monitored lifetime only; local [`Region`] values are
//! created and dropped independently of it.

use super::engine::GeomonitorEngine;
use super::error::GeoResult;
use super::region::Region;
use std::sync::Arc;

pub struct RegionStore {
    engine: Arc<GeomonitorEngine>,
}

impl RegionStore {
    pub fn new(engine: Arc<GeomonitorEngine>) -> Self {
        Self { engine }
    }

    /// Put a constructed region under monitoring. A TRANSIENT region
    /// requires at least one open service handle; the engine rejects it
    /// with `NotificationsReceiverNotAdded` otherwise.
    pub fn add(&self, region: &Region) -> GeoResult<()> {
        self.engine.add(region)
    }

    /// Retrieve a monitored region by name.
    pub fn find(&self, name: &str) -> GeoResult<Region> {
        self.engine.find(name)
    }

    /// Names of all monitored regions, capped and sorted.
    pub fn find_all(&self) -> Vec<String> {
        self.engine.find_all()
    }

    /// Monitored regions within `radius` meters of the last known
    /// position, nearest first.
    pub fn search_nearby(&self, radius: f64) -> GeoResult<Vec<String>> {
        self.engine.search_nearby(radius)
    }

    /// Monitored regions within `radius` meters of a point, nearest first.
    pub fn search_by_location(
        &self,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> GeoResult<Vec<String>> {
        self.engine.search_by_location(latitude, longitude, radius)
    }

    /// Monitored regions whose name matches a mask (`*` wildcard).
    pub fn search_by_name(&self, mask: &str) -> Vec<String> {
        self.engine.search_by_name(mask)
    }

    /// Take a region out of monitoring. Independent of any local `Region`
    /// value's lifetime.
    pub fn remove(&self, name: &str) -> GeoResult<()> {
        self.engine.remove(name)
    }

    /// Take every region of this application out of monitoring.
    pub fn remove_all(&self) {
        self.engine.remove_all()
    }
}
