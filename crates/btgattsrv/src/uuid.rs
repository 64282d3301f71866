//! UUID type for GATT attributes

use std::fmt;

/// UUID for GATT attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uuid {
    /// 16-bit UUID (short form)
    Uuid16(u16),
    /// 32-bit UUID
    Uuid32(u32),
    /// 128-bit UUID (long form)
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Create a UUID from a 16-bit value
    pub fn from_u16(uuid: u16) -> Self {
        Uuid::Uuid16(uuid)
    }

    /// Create a UUID from a 32-bit value
    pub fn from_u32(uuid: u32) -> Self {
        Uuid::Uuid32(uuid)
    }

    /// Create a UUID from a 128-bit value
    pub fn from_u128(uuid: u128) -> Self {
        Uuid::Uuid128(uuid.to_le_bytes())
    }

    /// Parse a UUID string in short form ("180D" / "0x180D") or long form
    /// ("00002902-0000-1000-8000-00805f9b34fb").
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.contains('-') {
            let hex_digits: String = s.chars().filter(|c| *c != '-').collect();
            if hex_digits.len() != 32 {
                return None;
            }
            let raw = hex::decode(&hex_digits).ok()?;
            let mut bytes = [0u8; 16];
            // Display order is big-endian; storage is little-endian
            for (i, b) in raw.iter().enumerate() {
                bytes[15 - i] = *b;
            }
            Some(Uuid::Uuid128(bytes))
        } else {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
            match digits.len() {
                1..=4 => u16::from_str_radix(digits, 16).ok().map(Uuid::Uuid16),
                5..=8 => u32::from_str_radix(digits, 16).ok().map(Uuid::Uuid32),
                _ => None,
            }
        }
    }

    /// Get the little-endian byte representation of this UUID
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Uuid::Uuid16(uuid) => uuid.to_le_bytes().to_vec(),
            Uuid::Uuid32(uuid) => uuid.to_le_bytes().to_vec(),
            Uuid::Uuid128(uuid) => uuid.to_vec(),
        }
    }

    /// Get the 16-bit UUID value if this is a short-form UUID
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(uuid) => Some(*uuid),
            _ => None,
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Uuid16(uuid) => write!(f, "{:04x}", uuid),
            Uuid::Uuid32(uuid) => write!(f, "{:08x}", uuid),
            Uuid::Uuid128(uuid) => {
                write!(
                    f,
                    "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                    uuid[15], uuid[14], uuid[13], uuid[12],
                    uuid[11], uuid[10],
                    uuid[9], uuid[8],
                    uuid[7], uuid[6],
                    uuid[5], uuid[4], uuid[3], uuid[2], uuid[1], uuid[0]
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_short_form() {
        assert_eq!(Uuid::parse("180D"), Some(Uuid::Uuid16(0x180D)));
        assert_eq!(Uuid::parse("0x2902"), Some(Uuid::Uuid16(0x2902)));
        assert_eq!(Uuid::parse("0001180D"), Some(Uuid::Uuid32(0x0001180D)));
        assert_eq!(Uuid::parse(""), None);
        assert_eq!(Uuid::parse("notahex"), None);
    }

    #[test]
    fn parse_long_form_round_trips_display() {
        let s = "00002902-0000-1000-8000-00805f9b34fb";
        let uuid = Uuid::parse(s).unwrap();
        assert_eq!(uuid.to_string(), s);
    }
}
