//! GATT server protocol constants
//!
//! The numeric values here are wire-compatible with the ATT layer of real
//! BLE stacks and must not be changed.

// ATT protocol error codes carried inside read/write responses
pub const ATT_ERROR_NONE: u8 = 0x00;
pub const ATT_ERROR_INVALID_HANDLE: u8 = 0x01;
pub const ATT_ERROR_READ_NOT_PERMITTED: u8 = 0x02;
pub const ATT_ERROR_WRITE_NOT_PERMITTED: u8 = 0x03;
pub const ATT_ERROR_INVALID_PDU: u8 = 0x04;
pub const ATT_ERROR_INSUFFICIENT_AUTHENTICATION: u8 = 0x05;
pub const ATT_ERROR_REQUEST_NOT_SUPPORTED: u8 = 0x06;
pub const ATT_ERROR_INVALID_OFFSET: u8 = 0x07;
pub const ATT_ERROR_INSUFFICIENT_AUTHORIZATION: u8 = 0x08;
pub const ATT_ERROR_PREPARE_QUEUE_FULL: u8 = 0x09;
pub const ATT_ERROR_ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
pub const ATT_ERROR_ATTRIBUTE_NOT_LONG: u8 = 0x0B;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE: u8 = 0x0C;
pub const ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH: u8 = 0x0D;
pub const ATT_ERROR_UNLIKELY: u8 = 0x0E;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION: u8 = 0x0F;
pub const ATT_ERROR_UNSUPPORTED_GROUP_TYPE: u8 = 0x10;
pub const ATT_ERROR_INSUFFICIENT_RESOURCES: u8 = 0x11;
pub const ATT_ERROR_APPLICATION_ERROR_START: u8 = 0x80;
pub const ATT_ERROR_APPLICATION_ERROR_END: u8 = 0xFF;

// Characteristic property bits
pub const ATT_PROPERTY_BROADCAST: u8 = 0x01;
pub const ATT_PROPERTY_READ: u8 = 0x02;
pub const ATT_PROPERTY_WRITE_NORESP: u8 = 0x04;
pub const ATT_PROPERTY_WRITE: u8 = 0x08;
pub const ATT_PROPERTY_NOTIFY: u8 = 0x10;
pub const ATT_PROPERTY_INDICATE: u8 = 0x20;
pub const ATT_PROPERTY_WRITE_SIGNED: u8 = 0x40;
pub const ATT_PROPERTY_EXTENDED: u8 = 0x80;

// Attribute permission bits
pub const ATT_PERM_NONE: u8 = 0x00;
pub const ATT_PERM_READABLE: u8 = 0x01;
pub const ATT_PERM_READ_ENCRYPT_NO_MITM: u8 = 0x02;
pub const ATT_PERM_READ_ENCRYPT_MITM: u8 = 0x04;
pub const ATT_PERM_WRITABLE: u8 = 0x08;
pub const ATT_PERM_WRITE_ENCRYPT_NO_MITM: u8 = 0x10;
pub const ATT_PERM_WRITE_ENCRYPT_MITM: u8 = 0x20;

// Handle space
pub const ATT_HANDLE_MIN: u16 = 0x0001;
pub const ATT_HANDLE_MAX: u16 = 0xFFFF;

// Encryption key size bounds (0 means no encryption required)
pub const ATT_ENCRYPT_KEY_SIZE_MIN: u8 = 7;
pub const ATT_ENCRYPT_KEY_SIZE_MAX: u8 = 16;

// Declaration UUIDs used when serializing declaration attributes
pub const PRIMARY_SERVICE_UUID: u16 = 0x2800;
pub const SECONDARY_SERVICE_UUID: u16 = 0x2801;
pub const INCLUDE_UUID: u16 = 0x2802;
pub const CHARACTERISTIC_UUID: u16 = 0x2803;
