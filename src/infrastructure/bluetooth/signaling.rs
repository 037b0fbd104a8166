//! L2CAP signaling driver
//!
//! Opens SDP, HID control and HID interrupt channels in either direction and
//! runs the configuration handshake. A channel is open once both sides have
//! accepted each other's configuration.

use crate::infrastructure::bluetooth::commands::Command;
use crate::infrastructure::bluetooth::hid::HidPhase;
use crate::infrastructure::bluetooth::l2cap::{self, result, Signal};
use crate::infrastructure::bluetooth::peers::{ChannelKind, ChannelPhase, ConnRole};
use crate::infrastructure::bluetooth::service::BluetoothHost;
use tracing::{debug, info, warn};

/// Connection refused, PSM not supported
const RESULT_PSM_NOT_SUPPORTED: u16 = 0x0002;

impl BluetoothHost {
    /// Signaling channel payload from the link `handle`
    pub(crate) fn on_signaling(&mut self, handle: u16, payload: &[u8]) {
        let signal = match Signal::parse(payload) {
            Ok(signal) => signal,
            Err(e) => {
                debug!("Dropping signaling payload: {}", e);
                return;
            }
        };
        debug!("L2CAP {:?}", signal);

        match signal {
            Signal::ConnectionRequest { ident, psm, scid } => {
                self.on_conn_request(handle, ident, psm, scid)
            }
            Signal::ConnectionResponse {
                dcid, scid, result, ..
            } => self.on_conn_response(handle, dcid, scid, result),
            Signal::ConfigureRequest { ident, dcid, .. } => {
                self.on_conf_request(handle, ident, dcid)
            }
            Signal::ConfigureResponse { scid, result, .. } => self.on_conf_response(scid, result),
            Signal::DisconnectionRequest { ident, dcid, scid } => {
                self.on_disconn_request(handle, ident, dcid, scid)
            }
            Signal::DisconnectionResponse { scid, .. } => {
                if let Some((slot, kind)) = self.peers.find_by_channel_id(scid) {
                    debug!("Slot {}: {:?} channel closed", slot, kind);
                    self.close_channel(slot, kind);
                }
            }
            Signal::InformationRequest { ident, info_type } => {
                self.tx
                    .push(l2cap::info_rsp_not_supported(handle, ident, info_type));
            }
            Signal::CommandReject { ident, reason } => {
                warn!("L2CAP command {} rejected, reason {:#06X}", ident, reason)
            }
            Signal::Other { code, .. } => debug!("Unhandled L2CAP signal {:#04X}", code),
        }
    }

    /// Peer opens a channel towards us
    fn on_conn_request(&mut self, handle: u16, ident: u8, psm: u16, scid: u16) {
        let Some(slot) = self.peers.find_by_handle(handle) else {
            debug!("Connection request on unknown link {:#06X}", handle);
            return;
        };
        let Some(kind) = ChannelKind::from_psm(psm) else {
            warn!("Slot {}: refusing unsupported PSM {:#06X}", slot, psm);
            self.tx.push(l2cap::conn_rsp(
                handle,
                ident,
                0x0000,
                scid,
                RESULT_PSM_NOT_SUPPORTED,
            ));
            return;
        };
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };

        let conf_ident = peer.next_ident();
        let channel = peer.channel_mut(kind);
        channel.remote_id = scid;
        channel.phase = ChannelPhase::Configuring {
            local_done: false,
            remote_done: false,
        };
        info!("Slot {}: peer opens {:?} channel", slot, kind);
        self.tx.push(l2cap::conn_rsp(
            handle,
            ident,
            channel.local_id,
            scid,
            result::SUCCESS,
        ));
        self.tx.push(l2cap::conf_req(handle, conf_ident, scid));
    }

    /// Answer to our connection request; `scid` is our channel
    fn on_conn_response(&mut self, handle: u16, dcid: u16, scid: u16, result: u16) {
        let Some((slot, kind)) = self.peers.find_by_channel_id(scid) else {
            debug!("Connection response for unknown channel {:#06X}", scid);
            return;
        };
        match result {
            result::SUCCESS => {
                let Some(peer) = self.peers.get_mut(slot) else {
                    return;
                };
                let ident = peer.next_ident();
                let channel = peer.channel_mut(kind);
                if channel.phase != ChannelPhase::AwaitConnRsp {
                    debug!("Slot {}: unexpected {:?} connection response", slot, kind);
                    return;
                }
                channel.remote_id = dcid;
                channel.phase = ChannelPhase::Configuring {
                    local_done: false,
                    remote_done: false,
                };
                self.tx.push(l2cap::conf_req(handle, ident, dcid));
            }
            result::PENDING => debug!("Slot {}: {:?} connection pending", slot, kind),
            refused => {
                warn!(
                    "Slot {}: {:?} connection refused ({:#06X})",
                    slot, kind, refused
                );
                self.close_channel(slot, kind);
                self.channel_failed(slot, kind);
            }
        }
    }

    /// Peer's configuration of our channel `dcid`; accepted as is
    fn on_conf_request(&mut self, handle: u16, ident: u8, dcid: u16) {
        let Some((slot, kind)) = self.peers.find_by_channel_id(dcid) else {
            debug!("Configure request for unknown channel {:#06X}", dcid);
            return;
        };
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let channel = peer.channel_mut(kind);
        self.tx
            .push(l2cap::conf_rsp(handle, ident, channel.remote_id));
        if let ChannelPhase::Configuring { remote_done, .. } = &mut channel.phase {
            *remote_done = true;
        }
        self.check_open(slot, kind);
    }

    /// Peer's answer to our configuration; `scid` is our channel
    fn on_conf_response(&mut self, scid: u16, result: u16) {
        let Some((slot, kind)) = self.peers.find_by_channel_id(scid) else {
            debug!("Configure response for unknown channel {:#06X}", scid);
            return;
        };
        if result != result::SUCCESS {
            warn!(
                "Slot {}: {:?} configuration refused ({:#06X})",
                slot, kind, result
            );
            self.close_channel(slot, kind);
            self.channel_failed(slot, kind);
            return;
        }
        if let Some(peer) = self.peers.get_mut(slot) {
            if let ChannelPhase::Configuring { local_done, .. } = &mut peer.channel_mut(kind).phase
            {
                *local_done = true;
            }
        }
        self.check_open(slot, kind);
    }

    fn on_disconn_request(&mut self, handle: u16, ident: u8, dcid: u16, scid: u16) {
        self.tx.push(l2cap::disconn_rsp(handle, ident, dcid, scid));
        if let Some((slot, kind)) = self.peers.find_by_channel_id(dcid) {
            info!("Slot {}: peer closed {:?} channel", slot, kind);
            self.close_channel(slot, kind);
        }
    }

    fn check_open(&mut self, slot: usize, kind: ChannelKind) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let channel = peer.channel_mut(kind);
        if channel.phase
            != (ChannelPhase::Configuring {
                local_done: true,
                remote_done: true,
            })
        {
            return;
        }
        channel.phase = ChannelPhase::Open;
        info!("Slot {}: {:?} channel open", slot, kind);

        if kind == ChannelKind::Sdp {
            // Only probed, never used
            let (local_id, remote_id) = (channel.local_id, channel.remote_id);
            let ident = peer.next_ident();
            if let Some(handle) = peer.handle {
                self.tx
                    .push(l2cap::disconn_req(handle, ident, remote_id, local_id));
            }
        }

        if peer.role == ConnRole::Initiator
            && self.current_step(slot) == Some(Command::L2capConnect(kind))
        {
            self.step_succeeded(slot);
        }
        if kind == ChannelKind::HidInterrupt {
            self.hid_start(slot);
        }
    }

    fn close_channel(&mut self, slot: usize, kind: ChannelKind) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let channel = peer.channel_mut(kind);
        channel.phase = ChannelPhase::Closed;
        channel.remote_id = 0;
        if kind == ChannelKind::HidInterrupt {
            peer.hid = HidPhase::Idle;
        }
    }

    /// Refused connection or configuration counts against the connect step
    fn channel_failed(&mut self, slot: usize, kind: ChannelKind) {
        if self.current_step(slot) == Some(Command::L2capConnect(kind)) {
            self.step_failed(slot);
        }
    }
}
