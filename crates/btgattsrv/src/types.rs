//! Common types for the GATT server

use super::constants::*;
use super::uuid::Uuid;
use bitflags::bitflags;
use std::fmt;

/// Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Link type of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// LE link
    LowEnergy,
    /// BR/EDR link
    Classic,
}

/// Opaque identifier for one registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub(crate) u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection identity: every registry operation is parameterized by this
/// triple, so live connection state is looked up per call rather than held
/// in a persistent connection object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    pub instance: InstanceId,
    pub addr: BdAddr,
    pub device: DeviceType,
}

/// LE connection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Connection interval in 1.25ms units
    pub interval: u16,
    /// Slave latency in connection events
    pub latency: u16,
    /// Supervision timeout in 10ms units
    pub supervision_timeout: u16,
}

bitflags! {
    /// Characteristic property bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Properties: u8 {
        const BROADCAST = ATT_PROPERTY_BROADCAST;
        const READ = ATT_PROPERTY_READ;
        const WRITE_NORESP = ATT_PROPERTY_WRITE_NORESP;
        const WRITE = ATT_PROPERTY_WRITE;
        const NOTIFY = ATT_PROPERTY_NOTIFY;
        const INDICATE = ATT_PROPERTY_INDICATE;
        const WRITE_SIGNED = ATT_PROPERTY_WRITE_SIGNED;
        const EXTENDED = ATT_PROPERTY_EXTENDED;
    }
}

bitflags! {
    /// Attribute permission bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READABLE = ATT_PERM_READABLE;
        const READ_ENCRYPT_NO_MITM = ATT_PERM_READ_ENCRYPT_NO_MITM;
        const READ_ENCRYPT_MITM = ATT_PERM_READ_ENCRYPT_MITM;
        const WRITABLE = ATT_PERM_WRITABLE;
        const WRITE_ENCRYPT_NO_MITM = ATT_PERM_WRITE_ENCRYPT_NO_MITM;
        const WRITE_ENCRYPT_MITM = ATT_PERM_WRITE_ENCRYPT_MITM;
    }
}

impl Permissions {
    pub fn can_read(&self) -> bool {
        self.contains(Permissions::READABLE)
    }

    pub fn can_write(&self) -> bool {
        self.contains(Permissions::WRITABLE)
    }

    pub fn read_requires_encryption(&self) -> bool {
        self.intersects(Permissions::READ_ENCRYPT_NO_MITM | Permissions::READ_ENCRYPT_MITM)
    }

    pub fn write_requires_encryption(&self) -> bool {
        self.intersects(Permissions::WRITE_ENCRYPT_NO_MITM | Permissions::WRITE_ENCRYPT_MITM)
    }
}

/// Role-specific declaration data for one table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrDecl {
    /// Service declaration
    Service {
        /// Total entries belonging to this service, itself included
        attr_count: u16,
        /// Desired start handle; 0 requests auto-assignment at registration
        start_handle: u16,
        /// Number of handles the service spans; 0 derives it from the table
        handle_range: u16,
        /// Secondary rather than primary service
        secondary: bool,
        /// Export through SDP for BR/EDR visibility
        sdp_export: bool,
    },
    /// Include-service link
    Include {
        service_uuid: Uuid,
        included_handle: u16,
        end_group_handle: u16,
    },
    /// Characteristic declaration
    Characteristic {
        properties: Properties,
        permissions: Permissions,
        /// Required encryption key size: 0 (none) or 7-16 bytes
        key_size: u8,
        /// Handle the characteristic value occupies
        value_handle: u16,
    },
    /// Descriptor declaration
    Descriptor {
        permissions: Permissions,
        key_size: u8,
    },
}

/// Backing-data policy for one table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// No backing data
    None,
    /// Fixed buffer set once at creation
    Static(Vec<u8>),
    /// No buffer; all reads and writes routed through callbacks
    Dynamic { max_len: usize },
    /// Buffer seeded at creation, mutable via remote access, alerts fired
    Volatile { data: Vec<u8>, max_len: usize },
}

impl AttrValue {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            AttrValue::None => "none",
            AttrValue::Static(_) => "static",
            AttrValue::Dynamic { .. } => "dynamic",
            AttrValue::Volatile { .. } => "volatile",
        }
    }
}

/// One node of a flattened service tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The entry's own UUID: service UUID for service entries,
    /// characteristic UUID for characteristics, descriptor UUID otherwise
    pub uuid: Uuid,
    /// Caller-assigned handle, unique within the table
    pub handle: u16,
    pub decl: AttrDecl,
    pub value: AttrValue,
}
