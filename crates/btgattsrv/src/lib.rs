//! btgattsrv - A local GATT attribute server
//!
//! This library implements the server side of the GATT attribute model:
//! applications assemble a flat attribute table (service, characteristics,
//! descriptors, include links), validate it, and register it with a
//! [`GattServer`]. The server routes connection lifecycle and attribute
//! access events to a per-service callback set and mediates responses and
//! unsolicited pushes back to specific peers through a [`Transport`].
//!
//! Real radio I/O belongs to the platform Bluetooth stack below the
//! `Transport` seam; this crate owns the attribute/callback contract above it.

pub mod constants;
pub mod error;
pub mod server;
pub mod table;
pub mod types;
pub mod uuid;

#[cfg(test)]
mod tests;

// Re-export common types for convenience
pub use error::{AttErrorCode, SrvError, SrvResult};
pub use server::{GattServer, ServiceEvents, Transport};
pub use table::ServiceTable;
pub use types::{
    Attribute, AttrDecl, AttrValue, BdAddr, ConnectionParams, DeviceType, InstanceId, Permissions,
    Properties,
};
pub use uuid::Uuid;
