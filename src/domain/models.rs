use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Bluetooth device address, stored in over-the-air (little-endian) order.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Read an address from the start of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BdAddr({})", self)
    }
}

/// Controller (or controller + extension) classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Wii Remote with nothing plugged in
    WiiCore,
    WiiNunchuck,
    /// Classic Controller and Classic Controller Pro
    WiiClassic,
    WiiUPro,
    SwitchPro,
}

impl DeviceType {
    /// Devices configured through the Wii HID report protocol
    pub fn is_wii_family(self) -> bool {
        matches!(
            self,
            Self::WiiCore | Self::WiiNunchuck | Self::WiiClassic | Self::WiiUPro
        )
    }
}

/// Wired console detected on the output side of the bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemId {
    #[default]
    None = 0,
    N64,
    GameCube,
    Dreamcast,
    WiiExt,
    Nes,
    PcEngine,
    PlayStation,
    Genesis,
}

impl SystemId {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::N64,
            2 => Self::GameCube,
            3 => Self::Dreamcast,
            4 => Self::WiiExt,
            5 => Self::Nes,
            6 => Self::PcEngine,
            7 => Self::PlayStation,
            8 => Self::Genesis,
            _ => Self::None,
        }
    }
}

/// Shared view of the console system identifier.
///
/// Written by the wired-side detection logic, only read by the Bluetooth host.
#[derive(Debug, Clone, Default)]
pub struct SystemIdHandle(Arc<AtomicU8>);

impl SystemIdHandle {
    pub fn new(initial: SystemId) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn get(&self) -> SystemId {
        SystemId::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, system: SystemId) {
        self.0.store(system as u8, Ordering::Release);
    }
}

/// Normalised controller input handed to the wired translation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    /// HID report the state was decoded from
    pub report_id: u8,

    // Core buttons, as sent by the controller
    pub buttons: u16,

    // 10-bit accelerometer axes (x, y, z), when the report carries them
    pub accel: Option<[u16; 3]>,

    // Extension controller bytes (nunchuck, classic, pro pad ...), undecoded
    pub extension: Vec<u8>,
}

/// Events published by the host for the output side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A peer finished its HID configuration and starts streaming
    PeerReady {
        slot: usize,
        bdaddr: BdAddr,
        device: Option<DeviceType>,
    },
    Input {
        slot: usize,
        device: Option<DeviceType>,
        system: SystemId,
        state: ControllerState,
    },
    /// The slot was released (disconnect or connection failure)
    PeerRemoved { slot: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bdaddr_display_is_msb_first() {
        let addr = BdAddr([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(addr.to_string(), "06:05:04:03:02:01");
    }

    #[test]
    fn test_bdaddr_from_short_slice() {
        assert!(BdAddr::from_slice(&[0u8; 5]).is_none());
        assert_eq!(BdAddr::from_slice(&[7u8; 8]), Some(BdAddr([7; 6])));
    }

    #[test]
    fn test_system_id_handle_is_shared() {
        let handle = SystemIdHandle::new(SystemId::None);
        let detector = handle.clone();
        detector.set(SystemId::GameCube);
        assert_eq!(handle.get(), SystemId::GameCube);
    }
}
