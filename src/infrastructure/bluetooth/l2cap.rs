//! L2CAP signaling codec
//!
//! Builds and parses the signaling commands carried on channel 0x0001 of
//! a BR/EDR ACL link. Only the commands needed to open the SDP and HID
//! channels are supported.

use crate::infrastructure::bluetooth::error::{need, HostError};
use crate::infrastructure::bluetooth::hci;

/// BR/EDR signaling channel
pub const CID_SIGNALING: u16 = 0x0001;

/// Protocol/service multiplexers
pub mod psm {
    pub const SDP: u16 = 0x0001;
    pub const HID_CONTROL: u16 = 0x0011;
    pub const HID_INTERRUPT: u16 = 0x0013;
}

/// Signaling command codes
pub mod code {
    pub const COMMAND_REJECT: u8 = 0x01;
    pub const CONN_REQ: u8 = 0x02;
    pub const CONN_RSP: u8 = 0x03;
    pub const CONF_REQ: u8 = 0x04;
    pub const CONF_RSP: u8 = 0x05;
    pub const DISCONN_REQ: u8 = 0x06;
    pub const DISCONN_RSP: u8 = 0x07;
    pub const INFO_REQ: u8 = 0x0A;
    pub const INFO_RSP: u8 = 0x0B;
}

/// Connection response results
pub mod result {
    pub const SUCCESS: u16 = 0x0000;
    pub const PENDING: u16 = 0x0001;
}

/// MTU advertised in our configuration requests
pub const MTU: u16 = 672;

const OPTION_MTU: u8 = 0x01;
const INFO_NOT_SUPPORTED: u16 = 0x0001;

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn signal(handle: u16, code: u8, ident: u8, data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + data.len());
    payload.push(code);
    payload.push(ident);
    payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
    payload.extend_from_slice(data);
    hci::acl(handle, CID_SIGNALING, &payload)
}

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn conn_req(handle: u16, ident: u8, psm: u16, scid: u16) -> Vec<u8> {
    signal(handle, code::CONN_REQ, ident, &words(&[psm, scid]))
}

pub fn conn_rsp(handle: u16, ident: u8, dcid: u16, scid: u16, result: u16) -> Vec<u8> {
    signal(
        handle,
        code::CONN_RSP,
        ident,
        &words(&[dcid, scid, result, 0x0000]),
    )
}

/// Configuration request for the peer's channel `dcid`, advertising our MTU
pub fn conf_req(handle: u16, ident: u8, dcid: u16) -> Vec<u8> {
    let mut data = words(&[dcid, 0x0000]);
    data.extend_from_slice(&[OPTION_MTU, 0x02]);
    data.extend_from_slice(&MTU.to_le_bytes());
    signal(handle, code::CONF_REQ, ident, &data)
}

/// Accept the peer's configuration unchanged
pub fn conf_rsp(handle: u16, ident: u8, scid: u16) -> Vec<u8> {
    signal(
        handle,
        code::CONF_RSP,
        ident,
        &words(&[scid, 0x0000, result::SUCCESS]),
    )
}

pub fn disconn_req(handle: u16, ident: u8, dcid: u16, scid: u16) -> Vec<u8> {
    signal(handle, code::DISCONN_REQ, ident, &words(&[dcid, scid]))
}

pub fn disconn_rsp(handle: u16, ident: u8, dcid: u16, scid: u16) -> Vec<u8> {
    signal(handle, code::DISCONN_RSP, ident, &words(&[dcid, scid]))
}

pub fn info_rsp_not_supported(handle: u16, ident: u8, info_type: u16) -> Vec<u8> {
    signal(
        handle,
        code::INFO_RSP,
        ident,
        &words(&[info_type, INFO_NOT_SUPPORTED]),
    )
}

/// Decoded signaling command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ConnectionRequest {
        ident: u8,
        psm: u16,
        scid: u16,
    },
    ConnectionResponse {
        ident: u8,
        dcid: u16,
        scid: u16,
        result: u16,
        status: u16,
    },
    ConfigureRequest {
        ident: u8,
        dcid: u16,
        flags: u16,
    },
    ConfigureResponse {
        ident: u8,
        scid: u16,
        flags: u16,
        result: u16,
    },
    DisconnectionRequest {
        ident: u8,
        dcid: u16,
        scid: u16,
    },
    DisconnectionResponse {
        ident: u8,
        dcid: u16,
        scid: u16,
    },
    InformationRequest {
        ident: u8,
        info_type: u16,
    },
    CommandReject {
        ident: u8,
        reason: u16,
    },
    Other {
        code: u8,
        ident: u8,
    },
}

impl Signal {
    /// Parse the first command of a signaling payload
    pub fn parse(payload: &[u8]) -> Result<Self, HostError> {
        need("signaling header", payload, 4)?;
        let code = payload[0];
        let ident = payload[1];
        let len = le16(payload, 2) as usize;
        let d = &payload[4..];
        need("signaling data", d, len)?;

        let signal = match code {
            code::CONN_REQ => {
                need("connection request", d, 4)?;
                Signal::ConnectionRequest {
                    ident,
                    psm: le16(d, 0),
                    scid: le16(d, 2),
                }
            }
            code::CONN_RSP => {
                need("connection response", d, 8)?;
                Signal::ConnectionResponse {
                    ident,
                    dcid: le16(d, 0),
                    scid: le16(d, 2),
                    result: le16(d, 4),
                    status: le16(d, 6),
                }
            }
            code::CONF_REQ => {
                need("configure request", d, 4)?;
                Signal::ConfigureRequest {
                    ident,
                    dcid: le16(d, 0),
                    flags: le16(d, 2),
                }
            }
            code::CONF_RSP => {
                need("configure response", d, 6)?;
                Signal::ConfigureResponse {
                    ident,
                    scid: le16(d, 0),
                    flags: le16(d, 2),
                    result: le16(d, 4),
                }
            }
            code::DISCONN_REQ => {
                need("disconnection request", d, 4)?;
                Signal::DisconnectionRequest {
                    ident,
                    dcid: le16(d, 0),
                    scid: le16(d, 2),
                }
            }
            code::DISCONN_RSP => {
                need("disconnection response", d, 4)?;
                Signal::DisconnectionResponse {
                    ident,
                    dcid: le16(d, 0),
                    scid: le16(d, 2),
                }
            }
            code::INFO_REQ => {
                need("information request", d, 2)?;
                Signal::InformationRequest {
                    ident,
                    info_type: le16(d, 0),
                }
            }
            code::COMMAND_REJECT => {
                need("command reject", d, 2)?;
                Signal::CommandReject {
                    ident,
                    reason: le16(d, 0),
                }
            }
            code => Signal::Other { code, ident },
        };
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::hci::AclPacket;

    fn signaling_payload(frame: &[u8]) -> Vec<u8> {
        let acl = AclPacket::parse(&frame[1..]).unwrap();
        assert_eq!(acl.cid, CID_SIGNALING);
        acl.payload.to_vec()
    }

    #[test]
    fn test_conn_req_layout() {
        let frame = conn_req(0x0040, 1, psm::HID_CONTROL, 0x0080);
        assert_eq!(
            signaling_payload(&frame),
            vec![0x02, 0x01, 0x04, 0x00, 0x11, 0x00, 0x80, 0x00]
        );
    }

    #[test]
    fn test_conf_req_carries_mtu() {
        let frame = conf_req(0x0040, 2, 0x0041);
        assert_eq!(
            signaling_payload(&frame),
            vec![0x04, 0x02, 0x08, 0x00, 0x41, 0x00, 0x00, 0x00, 0x01, 0x02, 0xA0, 0x02]
        );
    }

    #[test]
    fn test_parse_conn_rsp() {
        let payload = [
            0x03, 0x01, 0x08, 0x00, 0x41, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(
            Signal::parse(&payload).unwrap(),
            Signal::ConnectionResponse {
                ident: 1,
                dcid: 0x0041,
                scid: 0x0080,
                result: result::SUCCESS,
                status: 0,
            }
        );
    }

    #[test]
    fn test_parse_own_conf_rsp() {
        let frame = conf_rsp(0x0040, 7, 0x0091);
        let payload = signaling_payload(&frame);
        assert_eq!(
            Signal::parse(&payload).unwrap(),
            Signal::ConfigureResponse {
                ident: 7,
                scid: 0x0091,
                flags: 0,
                result: result::SUCCESS,
            }
        );
    }

    #[test]
    fn test_truncated_signal() {
        assert!(Signal::parse(&[0x02, 0x01, 0x04, 0x00, 0x11]).is_err());
    }
}
