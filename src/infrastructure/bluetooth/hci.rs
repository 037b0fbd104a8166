//! HCI packet framing
//!
//! H4 framing as used between the host and the radio controller: every
//! packet starts with a one byte packet type, followed by a standard HCI
//! command, ACL data or event packet.

use crate::domain::models::BdAddr;
use crate::infrastructure::bluetooth::error::{need, HostError};

/// H4 packet type indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Command = 0x01,
    Acl = 0x02,
    Sco = 0x03,
    Event = 0x04,
}

impl TryFrom<u8> for PacketType {
    type Error = HostError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketType::Command),
            0x02 => Ok(PacketType::Acl),
            0x03 => Ok(PacketType::Sco),
            0x04 => Ok(PacketType::Event),
            _ => Err(HostError::UnknownPacketType(value)),
        }
    }
}

/// Command opcodes, `(OGF << 10) | OCF`
pub mod op {
    // Link control
    pub const INQUIRY: u16 = 0x0401;
    pub const INQUIRY_CANCEL: u16 = 0x0402;
    pub const CREATE_CONNECTION: u16 = 0x0405;
    pub const DISCONNECT: u16 = 0x0406;
    pub const ACCEPT_CONNECTION: u16 = 0x0409;
    pub const LINK_KEY_NEG_REPLY: u16 = 0x040C;
    pub const PIN_CODE_REPLY: u16 = 0x040D;
    pub const AUTH_REQUESTED: u16 = 0x0411;
    pub const SET_CONN_ENCRYPT: u16 = 0x0413;
    pub const REMOTE_NAME_REQUEST: u16 = 0x0419;
    pub const READ_REMOTE_FEATURES: u16 = 0x041B;
    pub const READ_REMOTE_EXT_FEATURES: u16 = 0x041C;
    pub const IO_CAPABILITY_REPLY: u16 = 0x042B;
    pub const USER_CONFIRM_REPLY: u16 = 0x042C;

    // Link policy
    pub const WRITE_DEFAULT_LINK_POLICY: u16 = 0x080F;

    // Controller & baseband
    pub const SET_EVENT_MASK: u16 = 0x0C01;
    pub const RESET: u16 = 0x0C03;
    pub const SET_EVENT_FILTER: u16 = 0x0C05;
    pub const READ_STORED_LINK_KEY: u16 = 0x0C0D;
    pub const DELETE_STORED_LINK_KEY: u16 = 0x0C12;
    pub const WRITE_LOCAL_NAME: u16 = 0x0C13;
    pub const READ_LOCAL_NAME: u16 = 0x0C14;
    pub const WRITE_CONN_ACCEPT_TIMEOUT: u16 = 0x0C16;
    pub const WRITE_PAGE_TIMEOUT: u16 = 0x0C18;
    pub const WRITE_SCAN_ENABLE: u16 = 0x0C1A;
    pub const READ_PAGE_SCAN_ACTIVITY: u16 = 0x0C1B;
    pub const WRITE_PAGE_SCAN_ACTIVITY: u16 = 0x0C1C;
    pub const WRITE_INQUIRY_SCAN_ACTIVITY: u16 = 0x0C1E;
    pub const WRITE_AUTH_ENABLE: u16 = 0x0C20;
    pub const READ_CLASS_OF_DEVICE: u16 = 0x0C23;
    pub const WRITE_CLASS_OF_DEVICE: u16 = 0x0C24;
    pub const READ_VOICE_SETTING: u16 = 0x0C25;
    pub const WRITE_HOLD_MODE_ACTIVITY: u16 = 0x0C2C;
    pub const READ_NUM_SUPPORTED_IAC: u16 = 0x0C38;
    pub const READ_CURRENT_IAC_LAP: u16 = 0x0C39;
    pub const WRITE_INQUIRY_MODE: u16 = 0x0C45;
    pub const READ_PAGE_SCAN_TYPE: u16 = 0x0C46;
    pub const WRITE_PAGE_SCAN_TYPE: u16 = 0x0C47;
    pub const WRITE_SSP_MODE: u16 = 0x0C56;
    pub const READ_INQUIRY_RSP_TX_POWER: u16 = 0x0C58;
    pub const WRITE_LE_HOST_SUPPORT: u16 = 0x0C6D;

    // Informational parameters
    pub const READ_LOCAL_VERSION_INFO: u16 = 0x1001;
    pub const READ_SUPPORTED_COMMANDS: u16 = 0x1002;
    pub const READ_LOCAL_FEATURES: u16 = 0x1003;
    pub const READ_LOCAL_EXT_FEATURES: u16 = 0x1004;
    pub const READ_BUFFER_SIZE: u16 = 0x1005;
    pub const READ_BD_ADDR: u16 = 0x1009;
}

/// Event codes
pub mod evt {
    pub const INQUIRY_COMPLETE: u8 = 0x01;
    pub const INQUIRY_RESULT: u8 = 0x02;
    pub const CONN_COMPLETE: u8 = 0x03;
    pub const CONN_REQUEST: u8 = 0x04;
    pub const DISCONN_COMPLETE: u8 = 0x05;
    pub const AUTH_COMPLETE: u8 = 0x06;
    pub const REMOTE_NAME_REQ_COMPLETE: u8 = 0x07;
    pub const ENCRYPT_CHANGE: u8 = 0x08;
    pub const REMOTE_FEATURES: u8 = 0x0B;
    pub const CMD_COMPLETE: u8 = 0x0E;
    pub const CMD_STATUS: u8 = 0x0F;
    pub const PIN_CODE_REQ: u8 = 0x16;
    pub const LINK_KEY_REQ: u8 = 0x17;
    pub const LINK_KEY_NOTIFY: u8 = 0x18;
    pub const INQUIRY_RESULT_WITH_RSSI: u8 = 0x22;
    pub const REMOTE_EXT_FEATURES: u8 = 0x23;
    pub const EXTENDED_INQUIRY_RESULT: u8 = 0x2F;
    pub const IO_CAPA_REQ: u8 = 0x31;
    pub const USER_CONFIRM_REQ: u8 = 0x33;
}

/// Status codes the host reacts to
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const UNKNOWN_COMMAND: u8 = 0x01;
    /// Remote user terminated connection
    pub const REMOTE_USER_TERMINATED: u8 = 0x13;
}

/// ACL link type in connection events
pub const LINK_TYPE_ACL: u8 = 0x01;

/// Build an H4 command packet
pub fn command(opcode: u16, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(PacketType::Command as u8);
    packet.extend_from_slice(&opcode.to_le_bytes());
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Build an H4 ACL packet carrying one complete L2CAP frame
pub fn acl(handle: u16, cid: u16, payload: &[u8]) -> Vec<u8> {
    let l2cap_len = payload.len() as u16;
    let acl_len = l2cap_len + 4;
    // Packet boundary 0b10: first automatically flushable fragment
    let handle_flags = (handle & 0x0FFF) | 0x2000;

    let mut packet = Vec::with_capacity(9 + payload.len());
    packet.push(PacketType::Acl as u8);
    packet.extend_from_slice(&handle_flags.to_le_bytes());
    packet.extend_from_slice(&acl_len.to_le_bytes());
    packet.extend_from_slice(&l2cap_len.to_le_bytes());
    packet.extend_from_slice(&cid.to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn bdaddr_at(what: &'static str, bytes: &[u8], at: usize) -> Result<BdAddr, HostError> {
    BdAddr::from_slice(&bytes[at.min(bytes.len())..]).ok_or(HostError::Truncated {
        what,
        len: bytes.len(),
    })
}

/// Decoded HCI event (without the H4 type byte)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HciEvent<'a> {
    InquiryComplete {
        status: u8,
    },
    /// Any of the three inquiry result formats; addresses in report order
    InquiryResult {
        addrs: Vec<BdAddr>,
    },
    ConnectionComplete {
        status: u8,
        handle: u16,
        bdaddr: BdAddr,
        link_type: u8,
    },
    ConnectionRequest {
        bdaddr: BdAddr,
        class: [u8; 3],
        link_type: u8,
    },
    DisconnectionComplete {
        status: u8,
        handle: u16,
        reason: u8,
    },
    AuthenticationComplete {
        status: u8,
        handle: u16,
    },
    RemoteNameComplete {
        status: u8,
        bdaddr: BdAddr,
        name: &'a [u8],
    },
    EncryptionChange {
        status: u8,
        handle: u16,
        enabled: bool,
    },
    RemoteFeatures {
        status: u8,
        handle: u16,
    },
    RemoteExtFeatures {
        status: u8,
        handle: u16,
    },
    CommandComplete {
        opcode: u16,
        status: u8,
        /// Return parameters after the status byte
        params: &'a [u8],
    },
    CommandStatus {
        status: u8,
        opcode: u16,
    },
    PinCodeRequest {
        bdaddr: BdAddr,
    },
    LinkKeyRequest {
        bdaddr: BdAddr,
    },
    LinkKeyNotify {
        bdaddr: BdAddr,
    },
    IoCapabilityRequest {
        bdaddr: BdAddr,
    },
    UserConfirmRequest {
        bdaddr: BdAddr,
    },
    Other {
        code: u8,
    },
}

impl<'a> HciEvent<'a> {
    /// Parse an event packet: `[code, param_len, params...]`
    pub fn parse(packet: &'a [u8]) -> Result<Self, HostError> {
        need("event header", packet, 2)?;
        let code = packet[0];
        let declared = packet[1] as usize;
        let p = &packet[2..];
        need("event parameters", p, declared)?;
        let p = &p[..declared];

        let event = match code {
            evt::INQUIRY_COMPLETE => {
                need("inquiry complete", p, 1)?;
                HciEvent::InquiryComplete { status: p[0] }
            }
            evt::INQUIRY_RESULT | evt::INQUIRY_RESULT_WITH_RSSI | evt::EXTENDED_INQUIRY_RESULT => {
                need("inquiry result", p, 1)?;
                // Parameters are stored array by array, so all addresses come first
                let addrs = p[1..]
                    .chunks_exact(6)
                    .take(p[0] as usize)
                    .filter_map(BdAddr::from_slice)
                    .collect();
                HciEvent::InquiryResult { addrs }
            }
            evt::CONN_COMPLETE => {
                need("connection complete", p, 10)?;
                HciEvent::ConnectionComplete {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                    bdaddr: bdaddr_at("connection complete", p, 3)?,
                    link_type: p[9],
                }
            }
            evt::CONN_REQUEST => {
                need("connection request", p, 10)?;
                HciEvent::ConnectionRequest {
                    bdaddr: bdaddr_at("connection request", p, 0)?,
                    class: [p[6], p[7], p[8]],
                    link_type: p[9],
                }
            }
            evt::DISCONN_COMPLETE => {
                need("disconnection complete", p, 4)?;
                HciEvent::DisconnectionComplete {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                    reason: p[3],
                }
            }
            evt::AUTH_COMPLETE => {
                need("authentication complete", p, 3)?;
                HciEvent::AuthenticationComplete {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                }
            }
            evt::REMOTE_NAME_REQ_COMPLETE => {
                need("remote name complete", p, 7)?;
                HciEvent::RemoteNameComplete {
                    status: p[0],
                    bdaddr: bdaddr_at("remote name complete", p, 1)?,
                    name: &p[7..],
                }
            }
            evt::ENCRYPT_CHANGE => {
                need("encryption change", p, 4)?;
                HciEvent::EncryptionChange {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                    enabled: p[3] != 0,
                }
            }
            evt::REMOTE_FEATURES => {
                need("remote features", p, 3)?;
                HciEvent::RemoteFeatures {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                }
            }
            evt::REMOTE_EXT_FEATURES => {
                need("remote extended features", p, 3)?;
                HciEvent::RemoteExtFeatures {
                    status: p[0],
                    handle: le16(p, 1) & 0x0FFF,
                }
            }
            evt::CMD_COMPLETE => {
                need("command complete", p, 3)?;
                // NOP completions carry no status byte
                let (status, params) = match p.get(3) {
                    Some(status) => (*status, &p[4..]),
                    None => (status::SUCCESS, &p[3..]),
                };
                HciEvent::CommandComplete {
                    opcode: le16(p, 1),
                    status,
                    params,
                }
            }
            evt::CMD_STATUS => {
                need("command status", p, 4)?;
                HciEvent::CommandStatus {
                    status: p[0],
                    opcode: le16(p, 2),
                }
            }
            evt::PIN_CODE_REQ => HciEvent::PinCodeRequest {
                bdaddr: bdaddr_at("pin code request", p, 0)?,
            },
            evt::LINK_KEY_REQ => HciEvent::LinkKeyRequest {
                bdaddr: bdaddr_at("link key request", p, 0)?,
            },
            evt::LINK_KEY_NOTIFY => HciEvent::LinkKeyNotify {
                bdaddr: bdaddr_at("link key notification", p, 0)?,
            },
            evt::IO_CAPA_REQ => HciEvent::IoCapabilityRequest {
                bdaddr: bdaddr_at("io capability request", p, 0)?,
            },
            evt::USER_CONFIRM_REQ => HciEvent::UserConfirmRequest {
                bdaddr: bdaddr_at("user confirmation request", p, 0)?,
            },
            code => HciEvent::Other { code },
        };
        Ok(event)
    }
}

/// Inbound ACL packet holding a single L2CAP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclPacket<'a> {
    pub handle: u16,
    /// Packet boundary flag, 0b01 marks a continuation fragment
    pub boundary: u8,
    pub cid: u16,
    pub payload: &'a [u8],
}

impl<'a> AclPacket<'a> {
    /// Parse `[handle+flags, len, l2cap_len, cid, payload...]`
    pub fn parse(packet: &'a [u8]) -> Result<Self, HostError> {
        need("acl header", packet, 4)?;
        let handle_flags = le16(packet, 0);
        let boundary = ((handle_flags >> 12) & 0x3) as u8;
        let acl_len = le16(packet, 2) as usize;
        let data = &packet[4..];
        need("acl data", data, acl_len)?;
        let data = &data[..acl_len];

        if boundary == 0x01 {
            return Ok(Self {
                handle: handle_flags & 0x0FFF,
                boundary,
                cid: 0,
                payload: data,
            });
        }

        need("l2cap header", data, 4)?;
        let l2cap_len = le16(data, 0) as usize;
        let cid = le16(data, 2);
        let payload = &data[4..];
        need("l2cap payload", payload, l2cap_len)?;

        Ok(Self {
            handle: handle_flags & 0x0FFF,
            boundary,
            cid,
            payload: &payload[..l2cap_len],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_command_packet() {
        assert_eq!(command(op::RESET, &[]), vec![0x01, 0x03, 0x0C, 0x00]);
    }

    #[test]
    fn test_command_packet_with_params() {
        assert_eq!(
            command(op::WRITE_SCAN_ENABLE, &[0x02]),
            vec![0x01, 0x1A, 0x0C, 0x01, 0x02]
        );
    }

    #[test]
    fn test_packet_type() {
        assert_eq!(PacketType::try_from(0x04), Ok(PacketType::Event));
        assert_eq!(
            PacketType::try_from(0xFF),
            Err(HostError::UnknownPacketType(0xFF))
        );
    }

    #[test]
    fn test_acl_layout() {
        let packet = acl(0x0B, 0x0001, &[0xAA, 0xBB]);
        assert_eq!(
            packet,
            vec![0x02, 0x0B, 0x20, 0x06, 0x00, 0x02, 0x00, 0x01, 0x00, 0xAA, 0xBB]
        );
        let parsed = AclPacket::parse(&packet[1..]).unwrap();
        assert_eq!(parsed.handle, 0x0B);
        assert_eq!(parsed.cid, 0x0001);
        assert_eq!(parsed.payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_command_complete() {
        let event = HciEvent::parse(&[0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]).unwrap();
        assert_eq!(
            event,
            HciEvent::CommandComplete {
                opcode: op::RESET,
                status: 0x00,
                params: &[]
            }
        );
    }

    #[test]
    fn test_parse_read_bd_addr_complete() {
        let event = HciEvent::parse(&[
            0x0E, 0x0A, 0x01, 0x09, 0x10, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
        ])
        .unwrap();
        match event {
            HciEvent::CommandComplete {
                opcode,
                status,
                params,
            } => {
                assert_eq!(opcode, op::READ_BD_ADDR);
                assert_eq!(status, 0);
                assert_eq!(params, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_inquiry_result_addresses() {
        let mut raw = vec![0x02, 0x00, 0x02];
        raw.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        raw.extend_from_slice(&[7, 8, 9, 10, 11, 12]);
        raw[1] = (raw.len() - 2) as u8;
        let event = HciEvent::parse(&raw).unwrap();
        assert_eq!(
            event,
            HciEvent::InquiryResult {
                addrs: vec![BdAddr([1, 2, 3, 4, 5, 6]), BdAddr([7, 8, 9, 10, 11, 12])]
            }
        );
    }

    #[test]
    fn test_parse_connection_complete() {
        let raw = [
            0x03, 0x0B, 0x00, 0x0B, 0x00, 1, 2, 3, 4, 5, 6, 0x01, 0x00,
        ];
        assert_eq!(
            HciEvent::parse(&raw).unwrap(),
            HciEvent::ConnectionComplete {
                status: 0,
                handle: 0x000B,
                bdaddr: BdAddr([1, 2, 3, 4, 5, 6]),
                link_type: LINK_TYPE_ACL,
            }
        );
    }

    #[test]
    fn test_truncated_event() {
        assert!(matches!(
            HciEvent::parse(&[0x03, 0x0B, 0x00]),
            Err(HostError::Truncated { .. })
        ));
        assert!(matches!(
            HciEvent::parse(&[0x03]),
            Err(HostError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unhandled_event_code() {
        assert_eq!(
            HciEvent::parse(&[0x13, 0x00]).unwrap(),
            HciEvent::Other { code: 0x13 }
        );
    }
}
