//! Peer slot table
//!
//! Fixed arena of seven peers. Every L2CAP channel we own carries its slot in
//! the low nibble of its channel id and its kind in the next nibble, so any
//! inbound channel id resolves to its peer without a search.

use crate::domain::models::{BdAddr, DeviceType};
use crate::infrastructure::bluetooth::error::PeerTableFull;
use crate::infrastructure::bluetooth::hid::HidPhase;
use crate::infrastructure::bluetooth::l2cap::psm;

pub const MAX_PEERS: usize = 7;

/// Attempts per connection step before the peer is dropped
pub const MAX_RETRY: u8 = 3;

/// The three channels opened to each peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Sdp,
    HidControl,
    HidInterrupt,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Sdp, Self::HidControl, Self::HidInterrupt];

    /// Tag OR'ed with the slot index to form our local channel id
    pub fn tag(self) -> u16 {
        match self {
            Self::Sdp => 0x0070,
            Self::HidControl => 0x0080,
            Self::HidInterrupt => 0x0090,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0x0070 => Some(Self::Sdp),
            0x0080 => Some(Self::HidControl),
            0x0090 => Some(Self::HidInterrupt),
            _ => None,
        }
    }

    pub fn psm(self) -> u16 {
        match self {
            Self::Sdp => psm::SDP,
            Self::HidControl => psm::HID_CONTROL,
            Self::HidInterrupt => psm::HID_INTERRUPT,
        }
    }

    pub fn from_psm(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.psm() == value)
    }

    fn index(self) -> usize {
        match self {
            Self::Sdp => 0,
            Self::HidControl => 1,
            Self::HidInterrupt => 2,
        }
    }
}

/// Local channel id for `kind` on `slot`
pub fn channel_id(slot: usize, kind: ChannelKind) -> u16 {
    slot as u16 | kind.tag()
}

/// Split a local channel id back into slot and kind
pub fn split_channel_id(cid: u16) -> Option<(usize, ChannelKind)> {
    let slot = (cid & 0x000F) as usize;
    if slot >= MAX_PEERS || cid & 0xFF00 != 0 {
        return None;
    }
    let kind = ChannelKind::from_tag(cid & 0x00F0)?;
    Some((slot, kind))
}

/// Signaling progress of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    #[default]
    Closed,
    /// Connection request sent, waiting for the peer's response
    AwaitConnRsp,
    Configuring {
        /// Peer accepted our configuration request
        local_done: bool,
        /// We accepted the peer's configuration request
        remote_done: bool,
    },
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub local_id: u16,
    pub remote_id: u16,
    pub phase: ChannelPhase,
}

/// Who started the ACL link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnRole {
    /// We paged the peer after an inquiry
    Initiator,
    /// The peer paged us
    Acceptor,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub slot: usize,
    pub bdaddr: BdAddr,
    pub handle: Option<u16>,
    pub role: ConnRole,
    /// Index into the role's step table
    pub conn_step: usize,
    pub retry: u8,
    pub device_type: Option<DeviceType>,
    pub hid: HidPhase,
    /// Extension port flag from the last status report
    pub ext_connected: bool,
    /// Link encryption confirmed by the controller
    pub encrypted: bool,
    channels: [Channel; 3],
    ident: u8,
}

impl Peer {
    fn new(slot: usize, bdaddr: BdAddr, role: ConnRole) -> Self {
        let channels = ChannelKind::ALL.map(|kind| Channel {
            local_id: channel_id(slot, kind),
            remote_id: 0,
            phase: ChannelPhase::Closed,
        });
        Self {
            slot,
            bdaddr,
            handle: None,
            role,
            conn_step: 0,
            retry: 0,
            device_type: None,
            hid: HidPhase::Idle,
            ext_connected: false,
            encrypted: false,
            channels,
            ident: 0,
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> &Channel {
        &self.channels[kind.index()]
    }

    pub fn channel_mut(&mut self, kind: ChannelKind) -> &mut Channel {
        &mut self.channels[kind.index()]
    }

    /// Next signaling identifier; zero is reserved
    pub fn next_ident(&mut self) -> u8 {
        self.ident = self.ident.wrapping_add(1);
        if self.ident == 0 {
            self.ident = 1;
        }
        self.ident
    }
}

#[derive(Debug, Default)]
pub struct PeerTable {
    slots: [Option<Peer>; MAX_PEERS],
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lowest free slot
    pub fn allocate(&mut self, bdaddr: BdAddr, role: ConnRole) -> Result<usize, PeerTableFull> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(PeerTableFull)?;
        self.slots[slot] = Some(Peer::new(slot, bdaddr, role));
        Ok(slot)
    }

    pub fn find_by_address(&self, bdaddr: &BdAddr) -> Option<usize> {
        self.iter().find(|p| p.bdaddr == *bdaddr).map(|p| p.slot)
    }

    pub fn find_by_handle(&self, handle: u16) -> Option<usize> {
        self.iter().find(|p| p.handle == Some(handle)).map(|p| p.slot)
    }

    /// Resolve one of our local channel ids to an occupied slot
    pub fn find_by_channel_id(&self, cid: u16) -> Option<(usize, ChannelKind)> {
        let (slot, kind) = split_channel_id(cid)?;
        self.slots[slot].as_ref().map(|_| (slot, kind))
    }

    pub fn release(&mut self, slot: usize) -> Option<Peer> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, slot: usize) -> Option<&Peer> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Peer> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> BdAddr {
        BdAddr([n, 0x11, 0x22, 0x33, 0x44, 0x55])
    }

    #[test]
    fn test_channel_id_round_trip() {
        let mut table = PeerTable::new();
        for n in 0..MAX_PEERS {
            table.allocate(addr(n as u8), ConnRole::Initiator).unwrap();
        }
        for slot in 0..MAX_PEERS {
            for kind in ChannelKind::ALL {
                let cid = table.get(slot).unwrap().channel(kind).local_id;
                assert_eq!(cid, channel_id(slot, kind));
                assert_eq!(table.find_by_channel_id(cid), Some((slot, kind)));
            }
        }
    }

    #[test]
    fn test_foreign_channel_ids() {
        let mut table = PeerTable::new();
        table.allocate(addr(1), ConnRole::Initiator).unwrap();
        // Signaling channel, a free slot, an unknown tag and a peer-assigned id
        assert_eq!(table.find_by_channel_id(0x0001), None);
        assert_eq!(table.find_by_channel_id(0x0081), None);
        assert_eq!(table.find_by_channel_id(0x00A0), None);
        assert_eq!(table.find_by_channel_id(0x0470), None);
        assert_eq!(table.find_by_channel_id(0x0077), None);
    }

    #[test]
    fn test_full_table_and_reuse() {
        let mut table = PeerTable::new();
        for n in 0..MAX_PEERS {
            assert_eq!(table.allocate(addr(n as u8), ConnRole::Initiator), Ok(n));
        }
        assert_eq!(
            table.allocate(addr(99), ConnRole::Acceptor),
            Err(PeerTableFull)
        );

        let released = table.release(3).unwrap();
        assert_eq!(released.bdaddr, addr(3));
        assert_eq!(table.find_by_address(&addr(3)), None);

        assert_eq!(table.allocate(addr(99), ConnRole::Acceptor), Ok(3));
        assert_eq!(table.find_by_address(&addr(99)), Some(3));
        assert_eq!(table.get(3).unwrap().role, ConnRole::Acceptor);
    }

    #[test]
    fn test_find_by_handle() {
        let mut table = PeerTable::new();
        let slot = table.allocate(addr(1), ConnRole::Initiator).unwrap();
        assert_eq!(table.find_by_handle(0x0B), None);
        table.get_mut(slot).unwrap().handle = Some(0x0B);
        assert_eq!(table.find_by_handle(0x0B), Some(slot));
    }

    #[test]
    fn test_is_empty_after_release() {
        let mut table = PeerTable::new();
        assert!(table.is_empty());
        let slot = table.allocate(addr(1), ConnRole::Initiator).unwrap();
        assert!(!table.is_empty());
        table.release(slot);
        assert!(table.is_empty());
        assert!(table.release(slot).is_none());
    }

    #[test]
    fn test_ident_skips_zero() {
        let mut table = PeerTable::new();
        let slot = table.allocate(addr(1), ConnRole::Initiator).unwrap();
        let peer = table.get_mut(slot).unwrap();
        let first = peer.next_ident();
        assert_eq!(first, 1);
        for _ in 0..254 {
            peer.next_ident();
        }
        assert_eq!(peer.next_ident(), 1);
    }
}
