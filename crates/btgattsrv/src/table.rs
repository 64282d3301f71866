//! Attribute table construction and validation
//!
//! Applications hand the registry a flat, pre-linked array of attribute
//! entries with explicit handles. [`ServiceTable::validate`] checks the
//! structural invariants standalone, before registration is attempted; the
//! registry re-runs the same validation internally and refuses invalid
//! tables.

use super::constants::*;
use super::error::{SrvError, SrvResult};
use super::types::{AttrDecl, AttrValue, Attribute};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::{HashMap, HashSet};

/// Which side of an attribute a handle addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTarget {
    /// The declaration itself (service/include/characteristic declaration)
    Declaration,
    /// The backing value (characteristic value handle, descriptor value)
    Value,
}

/// A validated attribute table for one registration, with handles kept
/// relative to the table's own zero until the registry assigns a base.
#[derive(Debug, Clone)]
pub struct ServiceTable {
    entries: Vec<Attribute>,
    /// Absolute handle of relative handle 0, assigned at registration
    base: u16,
    /// Number of handles the table spans
    span: u16,
    /// Characteristic value handle -> declaration entry index
    value_to_decl: HashMap<u16, usize>,
}

impl ServiceTable {
    /// Validate the structural invariants of a flat entry array.
    ///
    /// Callable standalone before registration; returns a descriptive
    /// diagnostic on the first violation found.
    pub fn validate(entries: &[Attribute]) -> SrvResult<()> {
        if entries.is_empty() {
            return Err(SrvError::TableInvalid("table is empty".into()));
        }
        if !matches!(entries[0].decl, AttrDecl::Service { .. }) {
            return Err(SrvError::TableInvalid(format!(
                "first entry (handle {}) must be a service declaration, found {} entry",
                entries[0].handle,
                entries[0].value.kind()
            )));
        }

        let mut used_handles: HashSet<u16> = HashSet::new();
        let mut last_handle: Option<u16> = None;
        for entry in entries {
            if let Some(prev) = last_handle {
                if entry.handle <= prev {
                    return Err(SrvError::TableInvalid(format!(
                        "handles must be unique and ascending: {} follows {}",
                        entry.handle, prev
                    )));
                }
            }
            last_handle = Some(entry.handle);
            used_handles.insert(entry.handle);
        }

        // Characteristic value handles share the same handle space
        for entry in entries {
            if let AttrDecl::Characteristic { value_handle, .. } = entry.decl {
                if value_handle <= entry.handle {
                    return Err(SrvError::TableInvalid(format!(
                        "characteristic {} declares value handle {} not greater than \
                         its declaration handle {}",
                        entry.uuid, value_handle, entry.handle
                    )));
                }
                if !used_handles.insert(value_handle) {
                    return Err(SrvError::TableInvalid(format!(
                        "characteristic {} value handle {} collides with another handle",
                        entry.uuid, value_handle
                    )));
                }
            }
        }

        Self::check_service_counts(entries)?;

        for entry in entries {
            Self::check_entry(entry)?;
        }

        Ok(())
    }

    /// Each service declaration's attribute count must equal the number of
    /// entries in its group: the service entry itself plus every
    /// characteristic, descriptor and include link up to the next service.
    fn check_service_counts(entries: &[Attribute]) -> SrvResult<()> {
        let mut current: Option<(u16, u16, u16)> = None; // (handle, declared, actual)
        for entry in entries {
            if let AttrDecl::Service { attr_count, .. } = entry.decl {
                if let Some((handle, declared, actual)) = current.take() {
                    if declared != actual {
                        return Err(SrvError::TableInvalid(format!(
                            "service at handle {} declares {} attributes but the \
                             table carries {} (count mismatch)",
                            handle, declared, actual
                        )));
                    }
                }
                current = Some((entry.handle, attr_count, 1));
            } else if let Some((_, _, ref mut actual)) = current {
                *actual += 1;
            }
        }
        if let Some((handle, declared, actual)) = current {
            if declared != actual {
                return Err(SrvError::TableInvalid(format!(
                    "service at handle {} declares {} attributes but the table \
                     carries {} (count mismatch)",
                    handle, declared, actual
                )));
            }
        }
        Ok(())
    }

    fn check_entry(entry: &Attribute) -> SrvResult<()> {
        match &entry.decl {
            AttrDecl::Service { .. } => {
                if !matches!(entry.value, AttrValue::None) {
                    return Err(SrvError::TableInvalid(format!(
                        "service declaration at handle {} must carry no value data, \
                         found {}",
                        entry.handle,
                        entry.value.kind()
                    )));
                }
            }
            AttrDecl::Characteristic { key_size, .. } | AttrDecl::Descriptor { key_size, .. } => {
                if *key_size != 0
                    && !(ATT_ENCRYPT_KEY_SIZE_MIN..=ATT_ENCRYPT_KEY_SIZE_MAX).contains(key_size)
                {
                    return Err(SrvError::TableInvalid(format!(
                        "entry at handle {} declares encryption key size {}, \
                         expected 0 or {}-{}",
                        entry.handle, key_size, ATT_ENCRYPT_KEY_SIZE_MIN, ATT_ENCRYPT_KEY_SIZE_MAX
                    )));
                }
            }
            AttrDecl::Include { .. } => {}
        }

        match &entry.value {
            AttrValue::Static(data) => {
                if data.is_empty() {
                    return Err(SrvError::TableInvalid(format!(
                        "static entry at handle {} has no backing buffer",
                        entry.handle
                    )));
                }
            }
            AttrValue::Volatile { data, max_len } => {
                if data.is_empty() {
                    return Err(SrvError::TableInvalid(format!(
                        "volatile entry at handle {} has no backing buffer",
                        entry.handle
                    )));
                }
                if data.len() > *max_len {
                    return Err(SrvError::TableInvalid(format!(
                        "volatile entry at handle {} seeds {} bytes but declares \
                         max length {}",
                        entry.handle,
                        data.len(),
                        max_len
                    )));
                }
            }
            AttrValue::Dynamic { max_len } => {
                if *max_len == 0 {
                    return Err(SrvError::TableInvalid(format!(
                        "dynamic entry at handle {} declares zero max length",
                        entry.handle
                    )));
                }
            }
            AttrValue::None => {}
        }
        Ok(())
    }

    /// Validate and index a flat entry array.
    pub fn build(entries: Vec<Attribute>) -> SrvResult<Self> {
        Self::validate(&entries)?;

        let mut max_handle = 0u16;
        let mut value_to_decl = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            max_handle = max_handle.max(entry.handle);
            if let AttrDecl::Characteristic { value_handle, .. } = entry.decl {
                max_handle = max_handle.max(value_handle);
                value_to_decl.insert(value_handle, idx);
            }
        }

        let span = max_handle - entries[0].handle + 1;
        let declared_range = match entries[0].decl {
            AttrDecl::Service { handle_range, .. } => handle_range,
            _ => 0,
        };
        if declared_range != 0 && declared_range < span {
            return Err(SrvError::TableInvalid(format!(
                "service declares a handle range of {} but the table spans {}",
                declared_range, span
            )));
        }

        Ok(Self {
            entries,
            base: 0,
            span: span.max(declared_range),
            value_to_decl,
        })
    }

    /// The start handle requested by the primary service declaration;
    /// 0 asks the registry to auto-assign one.
    pub fn requested_start(&self) -> u16 {
        match self.entries[0].decl {
            AttrDecl::Service { start_handle, .. } => start_handle,
            _ => 0,
        }
    }

    pub(crate) fn set_base(&mut self, base: u16) {
        self.base = base;
    }

    /// Absolute start handle after registration
    pub fn start_handle(&self) -> u16 {
        self.base
    }

    /// Absolute end handle after registration
    pub fn end_handle(&self) -> u16 {
        self.base + self.span - 1
    }

    pub fn contains(&self, handle: u16) -> bool {
        handle >= self.base && handle <= self.end_handle()
    }

    /// Resolve an absolute handle to its owning entry and which side of the
    /// attribute it addresses.
    pub fn resolve(&self, handle: u16) -> Option<(&Attribute, AccessTarget)> {
        if !self.contains(handle) {
            return None;
        }
        let rel =
            match u16::try_from(u32::from(handle - self.base) + u32::from(self.entries[0].handle)) {
                Ok(rel) => rel,
                Err(_) => return None,
            };
        if let Some(entry) = self.entries.iter().find(|e| e.handle == rel) {
            let target = match entry.decl {
                // Descriptors carry their value at the declaration handle
                AttrDecl::Descriptor { .. } => AccessTarget::Value,
                _ => AccessTarget::Declaration,
            };
            return Some((entry, target));
        }
        self.value_to_decl
            .get(&rel)
            .map(|idx| (&self.entries[*idx], AccessTarget::Value))
    }

    /// Store a remote write into a volatile entry's buffer.
    ///
    /// Returns the declared max length as the error payload when the data
    /// does not fit, `Ok(false)` when the handle resolves to a non-volatile
    /// entry, and `Ok(true)` on success.
    pub(crate) fn store_volatile(&mut self, handle: u16, data: &[u8]) -> Result<bool, usize> {
        if !self.contains(handle) {
            return Ok(false);
        }
        let rel =
            match u16::try_from(u32::from(handle - self.base) + u32::from(self.entries[0].handle)) {
                Ok(rel) => rel,
                Err(_) => return Ok(false),
            };
        let idx = if let Some(idx) = self.value_to_decl.get(&rel) {
            *idx
        } else if let Some(idx) = self.entries.iter().position(|e| e.handle == rel) {
            idx
        } else {
            return Ok(false);
        };
        match &mut self.entries[idx].value {
            AttrValue::Volatile { data: buf, max_len } => {
                if data.len() > *max_len {
                    return Err(*max_len);
                }
                buf.clear();
                buf.extend_from_slice(data);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Serialize the declaration payload a peer observes when reading a
    /// declaration handle.
    pub fn declaration_payload(&self, entry: &Attribute) -> Vec<u8> {
        let mut out = Vec::new();
        match &entry.decl {
            AttrDecl::Service { .. } => {
                out.extend_from_slice(&entry.uuid.as_bytes());
            }
            AttrDecl::Include {
                service_uuid,
                included_handle,
                end_group_handle,
            } => {
                out.write_u16::<LittleEndian>(*included_handle).unwrap();
                out.write_u16::<LittleEndian>(*end_group_handle).unwrap();
                out.extend_from_slice(&service_uuid.as_bytes());
            }
            AttrDecl::Characteristic {
                properties,
                value_handle,
                ..
            } => {
                out.push(properties.bits());
                let abs = self.base + (value_handle - self.entries[0].handle);
                out.write_u16::<LittleEndian>(abs).unwrap();
                out.extend_from_slice(&entry.uuid.as_bytes());
            }
            AttrDecl::Descriptor { .. } => {}
        }
        out
    }
}
