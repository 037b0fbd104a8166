//! HCI command builders and step tables
//!
//! The bring-up sequence and both per-peer connection sequences are plain
//! tables of [`CommandEntry`]. [`Command::encode`] is the one place that
//! turns an entry and its argument into a frame.

use crate::domain::models::BdAddr;
use crate::domain::settings::HostSettings;
use crate::infrastructure::bluetooth::hci::{self, op};
use crate::infrastructure::bluetooth::l2cap;
use crate::infrastructure::bluetooth::peers::ChannelKind;

/// General inquiry access code
const GIAC_LAP: [u8; 3] = [0x33, 0x8B, 0x9E];
/// DM1, DH1, DM3, DH3, DM5, DH5
const ACL_PACKET_TYPES: u16 = 0xCC18;
/// Page scan repetition mode R1
const PAGE_SCAN_REP_MODE: u8 = 0x01;
/// Peripheral major device class, and the mask selecting it
const FILTER_CLASS: [u8; 3] = [0x00, 0x05, 0x00];
const FILTER_CLASS_MASK: [u8; 3] = [0x00, 0x1F, 0x00];
const EVENT_MASK: [u8; 8] = [0xFF, 0xFF, 0xFB, 0xFF, 0x07, 0xF8, 0xBF, 0x3D];
const LOCAL_NAME_LEN: usize = 248;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Clear,
    /// Only report inquiry results from peripherals
    Inquiry,
    /// Peripheral connection requests, no auto accept
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // Controller bring-up
    Reset,
    ReadLocalFeatures,
    ReadLocalVersion,
    ReadBdAddr,
    ReadBufferSize,
    ReadClassOfDevice,
    ReadLocalName,
    ReadVoiceSetting,
    ReadNumSupportedIac,
    ReadCurrentIacLap,
    SetEventFilter(EventFilter),
    WriteConnAcceptTimeout,
    ReadSupportedCommands,
    WriteSspMode,
    WriteInquiryMode,
    ReadInquiryRspTxPower,
    ReadLocalExtFeatures,
    ReadStoredLinkKey,
    ReadPageScanActivity,
    ReadPageScanType,
    WriteLeHostSupport,
    DeleteStoredLinkKey,
    WriteClassOfDevice,
    WriteLocalName,
    WriteAuthEnable,
    SetEventMask,
    WritePageScanActivity,
    WriteInquiryScanActivity,
    WritePageScanType,
    WritePageTimeout,
    WriteHoldModeActivity,
    WriteScanEnable,
    WriteDefaultLinkPolicy,
    Inquiry,

    // Per peer
    CreateConnection,
    AcceptConnection,
    RemoteNameRequest,
    ReadRemoteFeatures,
    ReadRemoteExtFeatures,
    AuthRequested,
    SetConnEncryption,
    /// L2CAP connection request, not an HCI command
    L2capConnect(ChannelKind),
}

/// What a table entry needs from the peer to be encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    None,
    BdAddr,
    Handle,
    Peer,
}

/// Argument resolved from [`Param`] at issue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    None,
    BdAddr(BdAddr),
    Handle(u16),
    Channel { handle: u16, ident: u8, local_id: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: Command,
    pub param: Param,
}

impl CommandEntry {
    pub const fn new(command: Command, param: Param) -> Self {
        Self { command, param }
    }

    const fn plain(command: Command) -> Self {
        Self::new(command, Param::None)
    }
}

impl Command {
    /// HCI opcode, `None` for L2CAP signaling
    pub fn opcode(self) -> Option<u16> {
        let opcode = match self {
            Self::Reset => op::RESET,
            Self::ReadLocalFeatures => op::READ_LOCAL_FEATURES,
            Self::ReadLocalVersion => op::READ_LOCAL_VERSION_INFO,
            Self::ReadBdAddr => op::READ_BD_ADDR,
            Self::ReadBufferSize => op::READ_BUFFER_SIZE,
            Self::ReadClassOfDevice => op::READ_CLASS_OF_DEVICE,
            Self::ReadLocalName => op::READ_LOCAL_NAME,
            Self::ReadVoiceSetting => op::READ_VOICE_SETTING,
            Self::ReadNumSupportedIac => op::READ_NUM_SUPPORTED_IAC,
            Self::ReadCurrentIacLap => op::READ_CURRENT_IAC_LAP,
            Self::SetEventFilter(_) => op::SET_EVENT_FILTER,
            Self::WriteConnAcceptTimeout => op::WRITE_CONN_ACCEPT_TIMEOUT,
            Self::ReadSupportedCommands => op::READ_SUPPORTED_COMMANDS,
            Self::WriteSspMode => op::WRITE_SSP_MODE,
            Self::WriteInquiryMode => op::WRITE_INQUIRY_MODE,
            Self::ReadInquiryRspTxPower => op::READ_INQUIRY_RSP_TX_POWER,
            Self::ReadLocalExtFeatures => op::READ_LOCAL_EXT_FEATURES,
            Self::ReadStoredLinkKey => op::READ_STORED_LINK_KEY,
            Self::ReadPageScanActivity => op::READ_PAGE_SCAN_ACTIVITY,
            Self::ReadPageScanType => op::READ_PAGE_SCAN_TYPE,
            Self::WriteLeHostSupport => op::WRITE_LE_HOST_SUPPORT,
            Self::DeleteStoredLinkKey => op::DELETE_STORED_LINK_KEY,
            Self::WriteClassOfDevice => op::WRITE_CLASS_OF_DEVICE,
            Self::WriteLocalName => op::WRITE_LOCAL_NAME,
            Self::WriteAuthEnable => op::WRITE_AUTH_ENABLE,
            Self::SetEventMask => op::SET_EVENT_MASK,
            Self::WritePageScanActivity => op::WRITE_PAGE_SCAN_ACTIVITY,
            Self::WriteInquiryScanActivity => op::WRITE_INQUIRY_SCAN_ACTIVITY,
            Self::WritePageScanType => op::WRITE_PAGE_SCAN_TYPE,
            Self::WritePageTimeout => op::WRITE_PAGE_TIMEOUT,
            Self::WriteHoldModeActivity => op::WRITE_HOLD_MODE_ACTIVITY,
            Self::WriteScanEnable => op::WRITE_SCAN_ENABLE,
            Self::WriteDefaultLinkPolicy => op::WRITE_DEFAULT_LINK_POLICY,
            Self::Inquiry => op::INQUIRY,
            Self::CreateConnection => op::CREATE_CONNECTION,
            Self::AcceptConnection => op::ACCEPT_CONNECTION,
            Self::RemoteNameRequest => op::REMOTE_NAME_REQUEST,
            Self::ReadRemoteFeatures => op::READ_REMOTE_FEATURES,
            Self::ReadRemoteExtFeatures => op::READ_REMOTE_EXT_FEATURES,
            Self::AuthRequested => op::AUTH_REQUESTED,
            Self::SetConnEncryption => op::SET_CONN_ENCRYPT,
            Self::L2capConnect(_) => return None,
        };
        Some(opcode)
    }

    /// Build the frame for this command. `None` when `arg` does not match
    /// what the command needs.
    pub fn encode(self, arg: Arg, cfg: &HostSettings) -> Option<Vec<u8>> {
        let mut params: Vec<u8> = Vec::new();
        match (self, arg) {
            (Self::L2capConnect(kind), Arg::Channel { handle, ident, local_id }) => {
                return Some(l2cap::conn_req(handle, ident, kind.psm(), local_id));
            }
            (Self::L2capConnect(_), _) => return None,

            (Self::SetEventFilter(filter), Arg::None) => match filter {
                EventFilter::Clear => params.push(0x00),
                EventFilter::Inquiry => {
                    params.extend_from_slice(&[0x01, 0x01]);
                    params.extend_from_slice(&FILTER_CLASS);
                    params.extend_from_slice(&FILTER_CLASS_MASK);
                }
                EventFilter::Connection => {
                    params.extend_from_slice(&[0x02, 0x01]);
                    params.extend_from_slice(&FILTER_CLASS);
                    params.extend_from_slice(&FILTER_CLASS_MASK);
                    params.push(0x01);
                }
            },
            (Self::WriteConnAcceptTimeout, Arg::None) => {
                params.extend_from_slice(&0x7D00u16.to_le_bytes())
            }
            (Self::WriteSspMode | Self::WriteInquiryMode | Self::ReadLocalExtFeatures, Arg::None) => {
                params.push(0x01)
            }
            (Self::ReadStoredLinkKey | Self::DeleteStoredLinkKey, Arg::None) => {
                // Any address, all keys
                params.extend_from_slice(&[0u8; 6]);
                params.push(0x01);
            }
            (Self::WriteLeHostSupport, Arg::None) => params.extend_from_slice(&[0x00, 0x00]),
            (Self::WriteClassOfDevice, Arg::None) => params.extend_from_slice(&cfg.class_of_device),
            (Self::WriteLocalName, Arg::None) => {
                params.extend(cfg.local_name.bytes().take(LOCAL_NAME_LEN - 1));
                params.resize(LOCAL_NAME_LEN, 0);
            }
            (Self::WriteAuthEnable, Arg::None) => params.push(0x00),
            (Self::SetEventMask, Arg::None) => params.extend_from_slice(&EVENT_MASK),
            (Self::WritePageScanActivity, Arg::None) => {
                params.extend_from_slice(&0x0800u16.to_le_bytes());
                params.extend_from_slice(&0x0012u16.to_le_bytes());
            }
            (Self::WriteInquiryScanActivity, Arg::None) => {
                params.extend_from_slice(&0x1000u16.to_le_bytes());
                params.extend_from_slice(&0x0012u16.to_le_bytes());
            }
            (Self::WritePageScanType | Self::WriteHoldModeActivity, Arg::None) => {
                params.push(0x01)
            }
            (Self::WritePageTimeout, Arg::None) => {
                params.extend_from_slice(&cfg.page_timeout.to_le_bytes())
            }
            // Page scan only
            (Self::WriteScanEnable, Arg::None) => params.push(0x02),
            (Self::WriteDefaultLinkPolicy, Arg::None) => {
                params.extend_from_slice(&0x000Fu16.to_le_bytes())
            }
            (Self::Inquiry, Arg::None) => {
                params.extend_from_slice(&GIAC_LAP);
                params.push(cfg.inquiry_length);
                params.push(0x00);
            }
            (
                Self::Reset
                | Self::ReadLocalFeatures
                | Self::ReadLocalVersion
                | Self::ReadBdAddr
                | Self::ReadBufferSize
                | Self::ReadClassOfDevice
                | Self::ReadLocalName
                | Self::ReadVoiceSetting
                | Self::ReadNumSupportedIac
                | Self::ReadCurrentIacLap
                | Self::ReadSupportedCommands
                | Self::ReadInquiryRspTxPower
                | Self::ReadPageScanActivity
                | Self::ReadPageScanType,
                Arg::None,
            ) => {}

            (Self::CreateConnection, Arg::BdAddr(addr)) => {
                params.extend_from_slice(addr.as_bytes());
                params.extend_from_slice(&ACL_PACKET_TYPES.to_le_bytes());
                params.push(PAGE_SCAN_REP_MODE);
                params.push(0x00);
                params.extend_from_slice(&[0x00, 0x00]);
                // Allow role switch
                params.push(0x01);
            }
            (Self::AcceptConnection, Arg::BdAddr(addr)) => {
                params.extend_from_slice(addr.as_bytes());
                // Become master
                params.push(0x00);
            }
            (Self::RemoteNameRequest, Arg::BdAddr(addr)) => {
                params.extend_from_slice(addr.as_bytes());
                params.push(PAGE_SCAN_REP_MODE);
                params.push(0x00);
                params.extend_from_slice(&[0x00, 0x00]);
            }
            (Self::ReadRemoteFeatures | Self::AuthRequested, Arg::Handle(handle)) => {
                params.extend_from_slice(&handle.to_le_bytes())
            }
            (Self::ReadRemoteExtFeatures | Self::SetConnEncryption, Arg::Handle(handle)) => {
                // Feature page 1 / encryption on
                params.extend_from_slice(&handle.to_le_bytes());
                params.push(0x01);
            }
            _ => return None,
        }
        let opcode = self.opcode()?;
        Some(hci::command(opcode, &params))
    }
}

/// Controller configuration, in issue order. The final inquiry is
/// acknowledged by a command status, never a command complete.
pub const BRING_UP: &[CommandEntry] = &[
    CommandEntry::plain(Command::Reset),
    CommandEntry::plain(Command::ReadLocalFeatures),
    CommandEntry::plain(Command::ReadLocalVersion),
    CommandEntry::plain(Command::ReadBdAddr),
    CommandEntry::plain(Command::ReadBufferSize),
    CommandEntry::plain(Command::ReadClassOfDevice),
    CommandEntry::plain(Command::ReadLocalName),
    CommandEntry::plain(Command::ReadVoiceSetting),
    CommandEntry::plain(Command::ReadNumSupportedIac),
    CommandEntry::plain(Command::ReadCurrentIacLap),
    CommandEntry::plain(Command::SetEventFilter(EventFilter::Clear)),
    CommandEntry::plain(Command::WriteConnAcceptTimeout),
    CommandEntry::plain(Command::ReadSupportedCommands),
    CommandEntry::plain(Command::WriteSspMode),
    CommandEntry::plain(Command::WriteInquiryMode),
    CommandEntry::plain(Command::ReadInquiryRspTxPower),
    CommandEntry::plain(Command::ReadLocalExtFeatures),
    CommandEntry::plain(Command::ReadStoredLinkKey),
    CommandEntry::plain(Command::ReadPageScanActivity),
    CommandEntry::plain(Command::ReadPageScanType),
    CommandEntry::plain(Command::WriteLeHostSupport),
    CommandEntry::plain(Command::DeleteStoredLinkKey),
    CommandEntry::plain(Command::WriteClassOfDevice),
    CommandEntry::plain(Command::WriteLocalName),
    CommandEntry::plain(Command::SetEventFilter(EventFilter::Inquiry)),
    CommandEntry::plain(Command::SetEventFilter(EventFilter::Connection)),
    CommandEntry::plain(Command::WriteAuthEnable),
    CommandEntry::plain(Command::SetEventMask),
    CommandEntry::plain(Command::WritePageScanActivity),
    CommandEntry::plain(Command::WriteInquiryScanActivity),
    CommandEntry::plain(Command::WritePageScanType),
    CommandEntry::plain(Command::WritePageTimeout),
    CommandEntry::plain(Command::WriteHoldModeActivity),
    CommandEntry::plain(Command::WriteScanEnable),
    CommandEntry::plain(Command::WriteDefaultLinkPolicy),
    CommandEntry::plain(Command::Inquiry),
];

/// Steps for a peer found by inquiry
pub const INITIATOR_STEPS: &[CommandEntry] = &[
    CommandEntry::new(Command::CreateConnection, Param::BdAddr),
    CommandEntry::new(Command::RemoteNameRequest, Param::BdAddr),
    CommandEntry::new(Command::ReadRemoteFeatures, Param::Handle),
    CommandEntry::new(Command::ReadRemoteExtFeatures, Param::Handle),
    CommandEntry::new(Command::AuthRequested, Param::Handle),
    CommandEntry::new(Command::SetConnEncryption, Param::Handle),
    CommandEntry::new(Command::L2capConnect(ChannelKind::Sdp), Param::Peer),
    CommandEntry::new(Command::L2capConnect(ChannelKind::HidControl), Param::Peer),
    CommandEntry::new(Command::L2capConnect(ChannelKind::HidInterrupt), Param::Peer),
];

/// Steps for a peer that paged us; its channels are opened from the peer side
pub const ACCEPTOR_STEPS: &[CommandEntry] =
    &[CommandEntry::new(Command::AcceptConnection, Param::BdAddr)];
