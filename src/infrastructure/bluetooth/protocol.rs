//! Wii Remote HID Protocol
//!
//! Report definitions for Wii-family controllers. Reports travel as HIDP
//! DATA transactions on the HID interrupt channel: `0xA2 <id> ...` towards
//! the controller, `0xA1 <id> ...` from it.

use crate::domain::models::ControllerState;
use crate::infrastructure::bluetooth::error::{need, HostError};

/// HIDP DATA | Output
pub const HIDP_OUTPUT: u8 = 0xA2;
/// HIDP DATA | Input
pub const HIDP_INPUT: u8 = 0xA1;

/// Report identifiers
pub mod report {
    pub const LEDS: u8 = 0x11;
    pub const REPORT_MODE: u8 = 0x12;
    pub const STATUS_REQUEST: u8 = 0x15;
    pub const WRITE_MEMORY: u8 = 0x16;
    pub const READ_MEMORY: u8 = 0x17;
    pub const STATUS: u8 = 0x20;
    pub const READ_DATA: u8 = 0x21;
    pub const ACK: u8 = 0x22;
    /// First and last data reporting mode
    pub const DATA_FIRST: u8 = 0x30;
    pub const DATA_LAST: u8 = 0x3F;
}

/// Extension controller registers
pub mod extension {
    /// Write 0x55 to start the unencrypted init
    pub const ENABLE: u32 = 0xA400F0;
    /// Write 0x00 to finish it
    pub const FINALIZE: u32 = 0xA400FB;
    /// Six identifier bytes
    pub const ID: u32 = 0xA400FA;
    pub const ID_LEN: u16 = 6;
}

/// Status report flag: something is plugged into the extension port
pub const STATUS_EXTENSION_CONNECTED: u8 = 0x02;

/// Continuous reporting, core buttons + accelerometer + 16 extension bytes
pub const DEFAULT_REPORT_MODE: u8 = 0x35;

const CONTINUOUS: u8 = 0x04;
const REGISTER_SPACE: u8 = 0x04;
const WRITE_DATA_LEN: usize = 16;

/// Core button bits, without the accelerometer LSBs sharing the same bytes
const BUTTON_MASK: u16 = 0x1F9F;

/// Output reports sent to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputReport {
    /// Player LEDs, pattern in the low nibble
    SetLeds(u8),
    SetReportMode(u8),
    StatusRequest,
    WriteRegister { address: u32, value: u8 },
    ReadRegister { address: u32, size: u16 },
}

impl OutputReport {
    pub fn id(&self) -> u8 {
        match self {
            Self::SetLeds(_) => report::LEDS,
            Self::SetReportMode(_) => report::REPORT_MODE,
            Self::StatusRequest => report::STATUS_REQUEST,
            Self::WriteRegister { .. } => report::WRITE_MEMORY,
            Self::ReadRegister { .. } => report::READ_MEMORY,
        }
    }

    /// Interrupt channel payload, HIDP header included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![HIDP_OUTPUT, self.id()];
        match *self {
            Self::SetLeds(pattern) => out.push((pattern & 0x0F) << 4),
            Self::SetReportMode(mode) => out.extend_from_slice(&[CONTINUOUS, mode]),
            Self::StatusRequest => out.push(0x00),
            Self::WriteRegister { address, value } => {
                out.push(REGISTER_SPACE);
                out.extend_from_slice(&address.to_be_bytes()[1..]);
                out.push(1);
                let mut data = [0u8; WRITE_DATA_LEN];
                data[0] = value;
                out.extend_from_slice(&data);
            }
            Self::ReadRegister { address, size } => {
                out.push(REGISTER_SPACE);
                out.extend_from_slice(&address.to_be_bytes()[1..]);
                out.extend_from_slice(&size.to_be_bytes());
            }
        }
        out
    }
}

/// Decoded input report
///
/// # Layouts (after `0xA1`)
///
/// ```text
/// 0x20 status     : id, BB BB, flags, 00 00, battery
/// 0x21 read data  : id, BB BB, SE (size-1 << 4 | error), AA AA, 16 data bytes
/// 0x22 ack        : id, BB BB, report, error
/// 0x30..0x3F data : id, mode specific payload (see parse_data_report)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReport<'a> {
    Status {
        flags: u8,
    },
    ReadData {
        error: u8,
        size: usize,
        address: u16,
        data: &'a [u8],
    },
    Ack {
        report: u8,
        error: u8,
    },
    Data(ControllerState),
    Other {
        report_id: u8,
    },
}

impl<'a> InputReport<'a> {
    /// Parse an interrupt channel payload starting with the HIDP header
    pub fn parse(payload: &'a [u8]) -> Result<Self, HostError> {
        need("hid report", payload, 2)?;
        if payload[0] != HIDP_INPUT {
            return Ok(Self::Other {
                report_id: payload[1],
            });
        }
        let id = payload[1];
        let body = &payload[2..];

        let parsed = match id {
            report::STATUS => {
                need("status report", body, 3)?;
                Self::Status { flags: body[2] }
            }
            report::READ_DATA => {
                need("read data report", body, 5)?;
                let se = body[2];
                let size = ((se >> 4) + 1) as usize;
                let data = &body[5..];
                Self::ReadData {
                    error: se & 0x0F,
                    size,
                    address: u16::from_be_bytes([body[3], body[4]]),
                    data: &data[..size.min(data.len())],
                }
            }
            report::ACK => {
                need("acknowledge report", body, 4)?;
                Self::Ack {
                    report: body[2],
                    error: body[3],
                }
            }
            report::DATA_FIRST..=report::DATA_LAST => Self::Data(parse_data_report(id, body)),
            report_id => Self::Other { report_id },
        };
        Ok(parsed)
    }
}

/// Offset of the extension bytes inside a data report body
fn extension_offset(id: u8) -> Option<usize> {
    match id {
        0x32 | 0x34 => Some(2),
        0x35 => Some(5),
        0x36 => Some(12),
        0x37 => Some(15),
        0x3D => Some(0),
        _ => None,
    }
}

fn has_accel(id: u8) -> bool {
    matches!(id, 0x31 | 0x33 | 0x35 | 0x37)
}

/// Normalise a data reporting mode body (bytes after the report id)
///
/// ```text
/// [0-1]  : core buttons, accelerometer LSBs in the unused bits
/// [2-4]  : accelerometer MSBs x, y, z (0x31, 0x33, 0x35, 0x37)
/// [..]   : IR camera bytes, then extension bytes (offset per mode)
/// ```
///
/// Mode 0x3D carries extension bytes only.
pub fn parse_data_report(id: u8, body: &[u8]) -> ControllerState {
    let buttons = if id != 0x3D && body.len() >= 2 {
        u16::from_be_bytes([body[0], body[1]]) & BUTTON_MASK
    } else {
        0
    };

    let accel = if has_accel(id) && body.len() >= 5 {
        let (b0, b1) = (body[0] as u16, body[1] as u16);
        let (x, y, z) = (body[2] as u16, body[3] as u16, body[4] as u16);
        Some([
            (x << 2) | ((b0 >> 5) & 0x03),
            (y << 2) | ((b1 >> 4) & 0x02),
            (z << 2) | ((b1 >> 5) & 0x02),
        ])
    } else {
        None
    };

    let extension = extension_offset(id)
        .and_then(|offset| body.get(offset..))
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    ControllerState {
        report_id: id,
        buttons,
        accel,
        extension,
    }
}

/// Pass-through state for controllers that do not speak the Wii protocol
pub fn raw_state(payload: &[u8]) -> Option<ControllerState> {
    let (&header, rest) = payload.split_first()?;
    if header != HIDP_INPUT {
        return None;
    }
    let (&report_id, data) = rest.split_first()?;
    Some(ControllerState {
        report_id,
        buttons: 0,
        accel: None,
        extension: data.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_led_report() {
        assert_eq!(OutputReport::SetLeds(0x1).to_bytes(), vec![0xA2, 0x11, 0x10]);
        assert_eq!(OutputReport::SetLeds(0xC).to_bytes(), vec![0xA2, 0x11, 0xC0]);
    }

    #[test]
    fn test_report_mode_and_status_request() {
        assert_eq!(
            OutputReport::SetReportMode(DEFAULT_REPORT_MODE).to_bytes(),
            vec![0xA2, 0x12, 0x04, 0x35]
        );
        assert_eq!(
            OutputReport::StatusRequest.to_bytes(),
            vec![0xA2, 0x15, 0x00]
        );
    }

    #[test]
    fn test_write_register_layout() {
        let bytes = OutputReport::WriteRegister {
            address: extension::ENABLE,
            value: 0x55,
        }
        .to_bytes();
        assert_eq!(bytes.len(), 23);
        assert_eq!(&bytes[..8], &[0xA2, 0x16, 0x04, 0xA4, 0x00, 0xF0, 0x01, 0x55]);
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_register_layout() {
        let bytes = OutputReport::ReadRegister {
            address: extension::ID,
            size: extension::ID_LEN,
        }
        .to_bytes();
        assert_eq!(bytes, vec![0xA2, 0x17, 0x04, 0xA4, 0x00, 0xFA, 0x00, 0x06]);
    }

    #[test]
    fn test_parse_status() {
        let payload = [0xA1, 0x20, 0x00, 0x00, 0x02, 0x00, 0x00, 0xC0];
        assert_eq!(
            InputReport::parse(&payload).unwrap(),
            InputReport::Status { flags: 0x02 }
        );
    }

    #[test]
    fn test_parse_read_data() {
        let mut payload = vec![0xA1, 0x21, 0x00, 0x00, 0x50, 0x00, 0xFA];
        payload.extend_from_slice(&[0x00, 0x00, 0xA4, 0x20, 0x01, 0x20]);
        payload.extend_from_slice(&[0u8; 10]);
        match InputReport::parse(&payload).unwrap() {
            InputReport::ReadData {
                error,
                size,
                address,
                data,
            } => {
                assert_eq!(error, 0);
                assert_eq!(size, 6);
                assert_eq!(address, 0x00FA);
                assert_eq!(data, &[0x00, 0x00, 0xA4, 0x20, 0x01, 0x20]);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_parse_ack() {
        let payload = [0xA1, 0x22, 0x00, 0x00, 0x16, 0x00];
        assert_eq!(
            InputReport::parse(&payload).unwrap(),
            InputReport::Ack {
                report: report::WRITE_MEMORY,
                error: 0
            }
        );
    }

    #[test]
    fn test_parse_mode_35() {
        let mut payload = vec![0xA1, 0x35, 0x60, 0x48, 0x80, 0x81, 0x9A];
        payload.extend((0..16).map(|n| n as u8));
        let InputReport::Data(state) = InputReport::parse(&payload).unwrap() else {
            panic!("expected a data report");
        };
        assert_eq!(state.report_id, 0x35);
        // 0x6048 with the accelerometer LSB bits masked off
        assert_eq!(state.buttons, 0x0008);
        assert_eq!(
            state.accel,
            Some([(0x80 << 2) | 0x03, (0x81 << 2), (0x9A << 2) | 0x02])
        );
        assert_eq!(state.extension, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_parse_mode_3d_extension_only() {
        let payload: Vec<u8> = [0xA1, 0x3D].into_iter().chain([7u8; 21]).collect();
        let InputReport::Data(state) = InputReport::parse(&payload).unwrap() else {
            panic!("expected a data report");
        };
        assert_eq!(state.buttons, 0);
        assert_eq!(state.accel, None);
        assert_eq!(state.extension, vec![7u8; 21]);
    }

    #[test]
    fn test_raw_state() {
        let state = raw_state(&[0xA1, 0x3F, 0x01, 0x02]).unwrap();
        assert_eq!(state.report_id, 0x3F);
        assert_eq!(state.extension, vec![0x01, 0x02]);
        assert!(raw_state(&[0xA2, 0x3F]).is_none());
    }
}
