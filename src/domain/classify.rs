//! Device classification tables
//!
//! Maps a remote device name, or the 6-byte identifier read from a Wii
//! extension port, to a [`DeviceType`]. Tables are scanned in order and the
//! first match wins, so longer name prefixes must come before shorter ones.

use crate::domain::models::DeviceType;

/// Remote name prefix -> controller type
pub const NAME_TABLE: &[(&str, DeviceType)] = &[
    ("Nintendo RVL-CNT-01-UC", DeviceType::WiiUPro),
    ("Nintendo RVL-CNT-01-TR", DeviceType::WiiCore),
    ("Nintendo RVL-CNT-01", DeviceType::WiiCore),
    ("Pro Controller", DeviceType::SwitchPro),
];

/// Extension identifier (register 0xA400FA) -> controller type
pub const EXTENSION_TABLE: &[([u8; 6], DeviceType)] = &[
    ([0x00, 0x00, 0xA4, 0x20, 0x00, 0x00], DeviceType::WiiNunchuck),
    ([0x00, 0x00, 0xA4, 0x20, 0x01, 0x01], DeviceType::WiiClassic),
    // Classic Controller Pro
    ([0x01, 0x00, 0xA4, 0x20, 0x01, 0x01], DeviceType::WiiClassic),
    ([0x00, 0x00, 0xA4, 0x20, 0x01, 0x20], DeviceType::WiiUPro),
];

/// Classify from the raw name bytes of a remote name request.
///
/// The name field is NUL padded; only the prefix is compared.
pub fn type_from_name(name: &[u8]) -> Option<DeviceType> {
    NAME_TABLE
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix.as_bytes()))
        .map(|(_, device)| *device)
}

/// Classify from the extension identifier bytes
pub fn type_from_extension(id: &[u8]) -> Option<DeviceType> {
    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| id.get(..ext.len()) == Some(&ext[..]))
        .map(|(_, device)| *device)
}

/// Printable part of a NUL padded name field
pub fn display_name(name: &[u8]) -> String {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    String::from_utf8_lossy(&name[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(name: &str) -> Vec<u8> {
        let mut raw = name.as_bytes().to_vec();
        raw.resize(248, 0);
        raw
    }

    #[test]
    fn test_name_prefix_order() {
        assert_eq!(
            type_from_name(&padded("Nintendo RVL-CNT-01-UC")),
            Some(DeviceType::WiiUPro)
        );
        assert_eq!(
            type_from_name(&padded("Nintendo RVL-CNT-01-TR")),
            Some(DeviceType::WiiCore)
        );
        assert_eq!(
            type_from_name(&padded("Nintendo RVL-CNT-01")),
            Some(DeviceType::WiiCore)
        );
        assert_eq!(
            type_from_name(&padded("Pro Controller")),
            Some(DeviceType::SwitchPro)
        );
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(type_from_name(&padded("Joy-Con (L)")), None);
        assert_eq!(type_from_name(b"Nintendo"), None);
    }

    #[test]
    fn test_extension_ids() {
        assert_eq!(
            type_from_extension(&[0x00, 0x00, 0xA4, 0x20, 0x01, 0x20]),
            Some(DeviceType::WiiUPro)
        );
        assert_eq!(
            type_from_extension(&[0x00, 0x00, 0xA4, 0x20, 0x00, 0x00]),
            Some(DeviceType::WiiNunchuck)
        );
        assert_eq!(
            type_from_extension(&[0x01, 0x00, 0xA4, 0x20, 0x01, 0x01]),
            Some(DeviceType::WiiClassic)
        );
        assert_eq!(
            type_from_extension(&[0xFF, 0x00, 0xA4, 0x20, 0x03, 0x01]),
            None
        );
        assert_eq!(type_from_extension(&[0x00, 0x00, 0xA4]), None);
    }

    #[test]
    fn test_display_name_stops_at_nul() {
        assert_eq!(display_name(&padded("Pro Controller")), "Pro Controller");
    }
}
