//! Error handling for the GATT server
//!
//! Two taxonomies live side by side: [`SrvError`] is the errno-style local
//! API surface (always recoverable by the caller), while [`AttErrorCode`] is
//! the protocol-level enumeration carried inside responses to the remote
//! peer (terminal for that one read/write only, never for the connection).

use super::constants::*;
use thiserror::Error;

/// ATT protocol error codes as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttErrorCode {
    /// No error
    NoError,
    /// Invalid handle
    InvalidHandle,
    /// Read not permitted
    ReadNotPermitted,
    /// Write not permitted
    WriteNotPermitted,
    /// Invalid PDU
    InvalidPdu,
    /// Insufficient authentication
    InsufficientAuthentication,
    /// Request not supported
    RequestNotSupported,
    /// Invalid offset
    InvalidOffset,
    /// Insufficient authorization
    InsufficientAuthorization,
    /// Prepare queue full
    PrepareQueueFull,
    /// Attribute not found
    AttributeNotFound,
    /// Attribute not long
    AttributeNotLong,
    /// Insufficient encryption key size
    InsufficientEncryptionKeySize,
    /// Invalid attribute value length
    InvalidAttributeValueLength,
    /// Unlikely error
    Unlikely,
    /// Insufficient encryption
    InsufficientEncryption,
    /// Unsupported group type
    UnsupportedGroupType,
    /// Insufficient resources
    InsufficientResources,
    /// Application error (0x80-0xFF)
    Application(u8),
    /// Unknown error code
    Unknown(u8),
}

impl From<u8> for AttErrorCode {
    fn from(code: u8) -> Self {
        match code {
            ATT_ERROR_NONE => AttErrorCode::NoError,
            ATT_ERROR_INVALID_HANDLE => AttErrorCode::InvalidHandle,
            ATT_ERROR_READ_NOT_PERMITTED => AttErrorCode::ReadNotPermitted,
            ATT_ERROR_WRITE_NOT_PERMITTED => AttErrorCode::WriteNotPermitted,
            ATT_ERROR_INVALID_PDU => AttErrorCode::InvalidPdu,
            ATT_ERROR_INSUFFICIENT_AUTHENTICATION => AttErrorCode::InsufficientAuthentication,
            ATT_ERROR_REQUEST_NOT_SUPPORTED => AttErrorCode::RequestNotSupported,
            ATT_ERROR_INVALID_OFFSET => AttErrorCode::InvalidOffset,
            ATT_ERROR_INSUFFICIENT_AUTHORIZATION => AttErrorCode::InsufficientAuthorization,
            ATT_ERROR_PREPARE_QUEUE_FULL => AttErrorCode::PrepareQueueFull,
            ATT_ERROR_ATTRIBUTE_NOT_FOUND => AttErrorCode::AttributeNotFound,
            ATT_ERROR_ATTRIBUTE_NOT_LONG => AttErrorCode::AttributeNotLong,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE => {
                AttErrorCode::InsufficientEncryptionKeySize
            }
            ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH => AttErrorCode::InvalidAttributeValueLength,
            ATT_ERROR_UNLIKELY => AttErrorCode::Unlikely,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION => AttErrorCode::InsufficientEncryption,
            ATT_ERROR_UNSUPPORTED_GROUP_TYPE => AttErrorCode::UnsupportedGroupType,
            ATT_ERROR_INSUFFICIENT_RESOURCES => AttErrorCode::InsufficientResources,
            c if c >= ATT_ERROR_APPLICATION_ERROR_START => AttErrorCode::Application(c),
            _ => AttErrorCode::Unknown(code),
        }
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> Self {
        match code {
            AttErrorCode::NoError => ATT_ERROR_NONE,
            AttErrorCode::InvalidHandle => ATT_ERROR_INVALID_HANDLE,
            AttErrorCode::ReadNotPermitted => ATT_ERROR_READ_NOT_PERMITTED,
            AttErrorCode::WriteNotPermitted => ATT_ERROR_WRITE_NOT_PERMITTED,
            AttErrorCode::InvalidPdu => ATT_ERROR_INVALID_PDU,
            AttErrorCode::InsufficientAuthentication => ATT_ERROR_INSUFFICIENT_AUTHENTICATION,
            AttErrorCode::RequestNotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
            AttErrorCode::InvalidOffset => ATT_ERROR_INVALID_OFFSET,
            AttErrorCode::InsufficientAuthorization => ATT_ERROR_INSUFFICIENT_AUTHORIZATION,
            AttErrorCode::PrepareQueueFull => ATT_ERROR_PREPARE_QUEUE_FULL,
            AttErrorCode::AttributeNotFound => ATT_ERROR_ATTRIBUTE_NOT_FOUND,
            AttErrorCode::AttributeNotLong => ATT_ERROR_ATTRIBUTE_NOT_LONG,
            AttErrorCode::InsufficientEncryptionKeySize => {
                ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE
            }
            AttErrorCode::InvalidAttributeValueLength => ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH,
            AttErrorCode::Unlikely => ATT_ERROR_UNLIKELY,
            AttErrorCode::InsufficientEncryption => ATT_ERROR_INSUFFICIENT_ENCRYPTION,
            AttErrorCode::UnsupportedGroupType => ATT_ERROR_UNSUPPORTED_GROUP_TYPE,
            AttErrorCode::InsufficientResources => ATT_ERROR_INSUFFICIENT_RESOURCES,
            AttErrorCode::Application(code) => code,
            AttErrorCode::Unknown(code) => code,
        }
    }
}

/// Local API errors for the GATT server registry
#[derive(Debug, Error)]
pub enum SrvError {
    /// The stack is mid-operation; retry later (EBUSY)
    #[error("Resource busy, retry")]
    Busy,

    /// Bad arguments or connection unavailable (EINVAL)
    #[error("Invalid argument: {0}")]
    InvalidArgs(String),

    /// Unknown or stale service instance (ENODEV)
    #[error("No such service instance")]
    NoDevice,

    /// Out of memory or handle space exhausted (ENOMEM)
    #[error("Out of resources: {0}")]
    NoMemory(String),

    /// Keep-alive or link state mismatch (ENOTCONN)
    #[error("Connection not in required state")]
    NotConnected,

    /// Operation invalid for this link type (ENOTSUP)
    #[error("Operation not supported on this link type")]
    NotSupported,

    /// Reentrancy hazard avoided (EDEADLK)
    #[error("Push from within callback dispatch would deadlock")]
    Deadlock,

    /// Attribute table failed validation
    #[error("Invalid attribute table: {0}")]
    TableInvalid(String),

    /// Internal stack fault
    #[error("Internal fault: {0}")]
    Internal(String),
}

/// Result type for GATT server operations
pub type SrvResult<T> = Result<T, SrvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn att_error_codes_round_trip() {
        for raw in 0u8..=0x11 {
            let code = AttErrorCode::from(raw);
            assert_eq!(u8::from(code), raw);
        }
        assert_eq!(AttErrorCode::from(0x05), AttErrorCode::InsufficientAuthentication);
        assert_eq!(AttErrorCode::from(0x0F), AttErrorCode::InsufficientEncryption);
        assert_eq!(AttErrorCode::from(0x10), AttErrorCode::UnsupportedGroupType);
    }

    #[test]
    fn application_error_range() {
        assert_eq!(AttErrorCode::from(0x80), AttErrorCode::Application(0x80));
        assert_eq!(AttErrorCode::from(0xFF), AttErrorCode::Application(0xFF));
        assert_eq!(u8::from(AttErrorCode::Application(0x9C)), 0x9C);
        // Codes between the protocol range and the application range stay opaque
        assert_eq!(AttErrorCode::from(0x42), AttErrorCode::Unknown(0x42));
    }
}
