//! Region value objects and geometry

use super::error::{GeoError, GeoResult};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on region names
pub const MAX_REGION_NAME_LEN: usize = 200;
/// Upper bound on notification invoke targets
pub const MAX_INVOKE_TARGET_LEN: usize = 50;
/// Upper bound on notification message text
pub const MAX_MESSAGE_LEN: usize = 100;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic shape under monitoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// No shape assigned yet
    None,
    /// Circle around a center point, radius in meters
    Circle {
        latitude: f64,
        longitude: f64,
        radius: f64,
    },
}

/// Monitored-lifetime policy for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringMode {
    /// Alive only while the owning process holds at least one open
    /// service handle
    Transient,
    /// Survives process exit; removed only by explicit call or expiration
    Persistent,
}

/// How a monitoring event is delivered to the notification target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMethod {
    None,
    Direct,
    Uib,
}

/// Kind of monitoring event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    None,
    Enter,
    Exit,
    OutOfService,
}

/// A position fix, marking where an event fired
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    /// UTC epoch seconds
    pub timestamp: u64,
    pub valid: bool,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: u64) -> GeoResult<Self> {
        check_coordinates(latitude, longitude)?;
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(GeoError::InvalidParameter);
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
            valid: true,
        })
    }

    /// An invalid placeholder fix
    pub fn invalid() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            accuracy: 0.0,
            timestamp: 0,
            valid: false,
        }
    }
}

fn check_coordinates(latitude: f64, longitude: f64) -> GeoResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(GeoError::InvalidLocation);
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(GeoError::InvalidLocation);
    }
    Ok(())
}

/// Great-circle distance between two coordinates in meters (haversine)
pub(crate) fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// A named geofence region.
///
/// This is a local value object: constructing and dropping it never touches
/// monitored state. A region only becomes monitored through
/// [`crate::RegionStore::add`] and stops being monitored through
/// [`crate::RegionStore::remove`], expiration, or its stop-monitoring event.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    name: String,
    shape: Shape,
    mode: MonitoringMode,
    /// UTC epoch seconds; 0 = never expires
    expiration: u64,
    invoke_target: String,
    notification_method: NotificationMethod,
    message: String,
    /// Event upon which the region deletes itself from monitoring
    stop_event: EventType,
}

impl Region {
    /// Create a region with the given unique name. Names are non-empty and
    /// at most [`MAX_REGION_NAME_LEN`] characters.
    pub fn new(name: &str) -> GeoResult<Self> {
        if name.is_empty() {
            return Err(GeoError::InvalidRegionName);
        }
        if name.chars().count() > MAX_REGION_NAME_LEN {
            return Err(GeoError::RegionNameTooLong);
        }
        Ok(Self {
            name: name.to_string(),
            shape: Shape::None,
            mode: MonitoringMode::Persistent,
            expiration: 0,
            invoke_target: String::new(),
            notification_method: NotificationMethod::None,
            message: String::new(),
            stop_event: EventType::None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.mode
    }

    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    pub fn invoke_target(&self) -> &str {
        &self.invoke_target
    }

    pub fn notification_method(&self) -> NotificationMethod {
        self.notification_method
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stop_monitoring_event(&self) -> EventType {
        self.stop_event
    }

    /// Assign a circular shape. Radius is in meters and must be positive.
    pub fn set_circle_shape(&mut self, latitude: f64, longitude: f64, radius: f64) -> GeoResult<()> {
        check_coordinates(latitude, longitude)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(GeoError::InvalidRadius);
        }
        self.shape = Shape::Circle {
            latitude,
            longitude,
            radius,
        };
        Ok(())
    }

    /// Set the expiration moment as UTC epoch seconds; 0 means never.
    /// Already-elapsed moments are accepted and purged on the next
    /// monitoring touch.
    pub fn set_expiration(&mut self, expiration: u64) {
        self.expiration = expiration;
    }

    pub fn set_monitoring_mode(&mut self, mode: MonitoringMode) {
        self.mode = mode;
    }

    pub fn set_notification_invoke_target(
        &mut self,
        target: &str,
        method: NotificationMethod,
    ) -> GeoResult<()> {
        if target.chars().count() > MAX_INVOKE_TARGET_LEN {
            return Err(GeoError::InvalidInvokeTarget);
        }
        self.invoke_target = target.to_string();
        self.notification_method = method;
        Ok(())
    }

    pub fn set_notification_message(&mut self, message: &str) -> GeoResult<()> {
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(GeoError::InvalidMessage);
        }
        self.message = message.to_string();
        Ok(())
    }

    /// The region removes itself from monitoring once this event fires.
    pub fn set_stop_monitoring_event(&mut self, event: EventType) {
        self.stop_event = event;
    }

    /// Whether the region's expiration moment has elapsed
    pub(crate) fn expired_at(&self, now: u64) -> bool {
        self.expiration != 0 && self.expiration <= now
    }

    /// Whether a fix falls inside the region's shape
    pub(crate) fn contains(&self, latitude: f64, longitude: f64) -> bool {
        match self.shape {
            Shape::None => false,
            Shape::Circle {
                latitude: clat,
                longitude: clon,
                radius,
            } => distance_m(latitude, longitude, clat, clon) <= radius,
        }
    }

    /// Distance from a point to the region's center, in meters
    pub(crate) fn center_distance(&self, latitude: f64, longitude: f64) -> Option<f64> {
        match self.shape {
            Shape::None => None,
            Shape::Circle {
                latitude: clat,
                longitude: clon,
                ..
            } => Some(distance_m(latitude, longitude, clat, clon)),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.shape, self.mode)
    }
}

/// Current UTC epoch seconds
pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
