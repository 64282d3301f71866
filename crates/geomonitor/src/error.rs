//! Error handling for the geomonitor
//!
//! A single enumeration spans local validation failures and service-side
//! failures, distinguished by numeric range: invalid-parameter codes live
//! in 0x10-0x1D, region codes in 0x100-0x105, notification codes in
//! 0x200-0x204. Callers can branch on category with the range predicates
//! and on individual values for precise handling; `Display` is the
//! canonical strerror rendering.

use thiserror::Error;

/// Geomonitor error codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeoError {
    // -- invalid parameter group (0x10-0x1D) --
    #[error("Invalid service handle")]
    InvalidHandle = 0x10,
    #[error("Invalid parameter")]
    InvalidParameter = 0x11,
    #[error("Invalid region name")]
    InvalidRegionName = 0x12,
    #[error("Invalid or missing region shape")]
    InvalidRegionShape = 0x13,
    #[error("Invalid circle radius")]
    InvalidRadius = 0x14,
    #[error("Invalid location coordinates")]
    InvalidLocation = 0x15,
    #[error("Invalid expiration time")]
    InvalidExpiration = 0x16,
    #[error("Invalid monitoring mode")]
    InvalidMonitoringMode = 0x17,
    #[error("Invalid event type")]
    InvalidEventType = 0x18,
    #[error("Invalid notification invoke target")]
    InvalidInvokeTarget = 0x19,
    #[error("Invalid notification message")]
    InvalidMessage = 0x1A,
    #[error("Out of memory")]
    OutOfMemory = 0x1B,
    #[error("Location services are disabled")]
    LocationServicesDisabled = 0x1C,
    #[error("Monitoring service unavailable")]
    ServiceUnavailable = 0x1D,

    // -- region group (0x100-0x105) --
    #[error("Region not found")]
    RegionNotFound = 0x100,
    #[error("Region already added")]
    RegionAlreadyAdded = 0x101,
    #[error("Region limit exceeded")]
    RegionLimitExceeded = 0x102,
    #[error("Region has expired")]
    RegionExpired = 0x103,
    #[error("Region is not monitored")]
    RegionNotMonitored = 0x104,
    #[error("Region name too long")]
    RegionNameTooLong = 0x105,

    // -- notification group (0x200-0x204) --
    #[error("No notifications receiver added")]
    NotificationsReceiverNotAdded = 0x200,
    #[error("Notification invoke target rejected")]
    NotificationInvalidTarget = 0x201,
    #[error("Notification message too long")]
    NotificationMessageTooLong = 0x202,
    #[error("Notification delivery failed")]
    NotificationDeliveryFailed = 0x203,
    #[error("Monitoring service timed out")]
    WarnTimeout = 0x204,
}

impl GeoError {
    /// The stable numeric code for this error
    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn is_invalid_parameter(&self) -> bool {
        (0x10..=0x1D).contains(&self.code())
    }

    pub fn is_region_error(&self) -> bool {
        (0x100..=0x1FF).contains(&self.code())
    }

    pub fn is_notification_error(&self) -> bool {
        (0x200..=0x2FF).contains(&self.code())
    }
}

/// Result type for geomonitor operations
pub type GeoResult<T> = Result<T, GeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fall_into_their_ranges() {
        assert_eq!(GeoError::InvalidHandle.code(), 0x10);
        assert_eq!(GeoError::RegionNotFound.code(), 0x100);
        assert_eq!(GeoError::NotificationsReceiverNotAdded.code(), 0x200);

        assert!(GeoError::InvalidRadius.is_invalid_parameter());
        assert!(!GeoError::InvalidRadius.is_region_error());
        assert!(GeoError::RegionAlreadyAdded.is_region_error());
        assert!(!GeoError::RegionAlreadyAdded.is_notification_error());
        assert!(GeoError::WarnTimeout.is_notification_error());
    }

    #[test]
    fn strerror_renders_every_code() {
        assert_eq!(GeoError::RegionNotFound.to_string(), "Region not found");
        assert_eq!(
            GeoError::LocationServicesDisabled.to_string(),
            "Location services are disabled"
        );
        assert!(!GeoError::WarnTimeout.to_string().is_empty());
    }
}
