//! geomonitor - A region-monitoring geofence engine
//!
//! Applications build named [`Region`] values (circle shape, expiration,
//! monitoring mode, notification target), register them with the monitoring
//! engine through a [`RegionStore`], and consume enter/exit/out-of-service
//! events through a [`GeomonitorService`] handle, either by blocking on
//! [`GeomonitorService::wait_event`] or by polling the handle's file
//! descriptor from an external `select()` loop.
//!
//! Region monitored lifetime and local value lifetime are deliberately
//! separate: dropping a `Region` never deregisters it; only
//! [`RegionStore::remove`] / [`RegionStore::remove_all`] do. TRANSIENT
//! regions additionally live only while the owning process holds at least
//! one open service handle.

pub mod engine;
pub mod error;
pub mod region;
pub mod service;
pub mod store;


// Re-export common types for convenience
pub use engine::GeomonitorEngine;
pub use error::{GeoError, GeoResult};
pub use region::{EventType, GeoLocation, MonitoringMode, NotificationMethod, Region, Shape};
pub use service::{Event, GeomonitorService};
pub use store::RegionStore;
