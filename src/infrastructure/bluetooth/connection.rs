//! Per-peer connection state machine
//!
//! Each peer walks its role's step table ([`INITIATOR_STEPS`] or
//! [`ACCEPTOR_STEPS`]). A step is issued, and the event that completes it
//! either moves the peer to the next step or counts a failure. Three
//! failures on one step drop the peer.

use crate::domain::classify;
use crate::domain::models::{BdAddr, HostEvent};
use crate::infrastructure::bluetooth::commands::{
    Arg, Command, CommandEntry, Param, ACCEPTOR_STEPS, INITIATOR_STEPS,
};
use crate::infrastructure::bluetooth::hci::{self, op, status};
use crate::infrastructure::bluetooth::peers::{ChannelPhase, ConnRole, MAX_RETRY};
use crate::infrastructure::bluetooth::service::BluetoothHost;
use tracing::{debug, error, info, warn};

/// NoInputNoOutput
const IO_CAPABILITY: u8 = 0x03;
const PIN_LEN: usize = 6;

pub fn steps(role: ConnRole) -> &'static [CommandEntry] {
    match role {
        ConnRole::Initiator => INITIATOR_STEPS,
        ConnRole::Acceptor => ACCEPTOR_STEPS,
    }
}

impl BluetoothHost {
    /// Command the peer is currently waiting on
    pub(crate) fn current_step(&self, slot: usize) -> Option<Command> {
        let peer = self.peers.get(slot)?;
        steps(peer.role).get(peer.conn_step).map(|e| e.command)
    }

    /// Issue the peer's current step
    pub(crate) fn issue_step(&mut self, slot: usize) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let Some(entry) = steps(peer.role).get(peer.conn_step).copied() else {
            debug!("Slot {}: connection steps finished", slot);
            return;
        };

        let arg = match (entry.param, entry.command, peer.handle) {
            (Param::None, _, _) => Arg::None,
            (Param::BdAddr, _, _) => Arg::BdAddr(peer.bdaddr),
            (Param::Handle, _, Some(handle)) => Arg::Handle(handle),
            (Param::Peer, Command::L2capConnect(kind), Some(handle)) => {
                let ident = peer.next_ident();
                let channel = peer.channel_mut(kind);
                channel.phase = ChannelPhase::AwaitConnRsp;
                Arg::Channel {
                    handle,
                    ident,
                    local_id: channel.local_id,
                }
            }
            (_, command, _) => {
                error!("Slot {}: no argument available for {:?}", slot, command);
                return;
            }
        };

        match entry.command.encode(arg, &self.config) {
            Some(frame) => {
                debug!(
                    "Slot {}: step {} {:?} (retry {})",
                    slot, peer.conn_step, entry.command, peer.retry
                );
                self.tx.push(frame);
            }
            None => error!("Slot {}: {:?} could not be encoded", slot, entry.command),
        }
    }

    /// The event for `command` arrived; advance or count a failure
    pub(crate) fn complete_step(&mut self, slot: usize, command: Command, status: u8) {
        if self.current_step(slot) != Some(command) {
            debug!("Slot {}: {:?} completion out of sequence", slot, command);
            return;
        }
        if status == status::SUCCESS {
            self.step_succeeded(slot);
        } else {
            warn!("Slot {}: {:?} failed with status {:#04X}", slot, command, status);
            self.step_failed(slot);
        }
    }

    pub(crate) fn step_succeeded(&mut self, slot: usize) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        peer.retry = 0;
        peer.conn_step += 1;
        self.issue_step(slot);
    }

    pub(crate) fn step_failed(&mut self, slot: usize) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        peer.retry += 1;
        if peer.retry < MAX_RETRY {
            self.issue_step(slot);
        } else {
            warn!("Slot {}: giving up after {} attempts", slot, peer.retry);
            self.release_peer(slot, true);
        }
    }

    /// Free the slot, tell the output side, and look for devices again once
    /// nothing is left
    pub(crate) fn release_peer(&mut self, slot: usize, disconnect: bool) {
        let Some(peer) = self.peers.release(slot) else {
            return;
        };
        info!("Slot {}: released {}", slot, peer.bdaddr);
        if let (true, Some(handle)) = (disconnect, peer.handle) {
            let mut params = handle.to_le_bytes().to_vec();
            params.push(status::REMOTE_USER_TERMINATED);
            self.tx.push(hci::command(op::DISCONNECT, &params));
        }
        let _ = self.events.send(HostEvent::PeerRemoved { slot });
        if self.peers.is_empty() {
            self.start_inquiry();
        }
    }

    pub(crate) fn on_connection_complete(&mut self, status: u8, handle: u16, bdaddr: BdAddr) {
        let Some(slot) = self.peers.find_by_address(&bdaddr) else {
            debug!("Connection complete for untracked {}", bdaddr);
            return;
        };
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let command = match peer.role {
            ConnRole::Initiator => Command::CreateConnection,
            ConnRole::Acceptor => Command::AcceptConnection,
        };
        if status == status::SUCCESS {
            info!("Slot {}: connected to {} (handle {:#06X})", slot, bdaddr, handle);
            peer.handle = Some(handle);
        }
        self.complete_step(slot, command, status);
    }

    pub(crate) fn on_remote_name(&mut self, status: u8, bdaddr: BdAddr, name: &[u8]) {
        let Some(slot) = self.peers.find_by_address(&bdaddr) else {
            return;
        };
        if status == status::SUCCESS {
            if let Some(peer) = self.peers.get_mut(slot) {
                peer.device_type = classify::type_from_name(name);
                info!(
                    "Slot {}: name \"{}\" -> {:?}",
                    slot,
                    classify::display_name(name),
                    peer.device_type
                );
            }
        }
        self.complete_step(slot, Command::RemoteNameRequest, status);
    }

    pub(crate) fn on_handle_step(&mut self, handle: u16, command: Command, status: u8) {
        match self.peers.find_by_handle(handle) {
            Some(slot) => self.complete_step(slot, command, status),
            None => debug!("{:?} completion for unknown handle {:#06X}", command, handle),
        }
    }

    pub(crate) fn on_encryption_change(&mut self, status: u8, handle: u16, enabled: bool) {
        if status == status::SUCCESS {
            if let Some(peer) = self
                .peers
                .find_by_handle(handle)
                .and_then(|slot| self.peers.get_mut(slot))
            {
                peer.encrypted = enabled;
            }
        }
        self.on_handle_step(handle, Command::SetConnEncryption, status);
    }

    /// Commands that fail before running are reported by command status only
    pub(crate) fn on_command_status(&mut self, status: u8, opcode: u16) {
        if status == status::SUCCESS {
            return;
        }
        if opcode == op::INQUIRY {
            warn!("Inquiry refused with status {:#04X}", status);
            return;
        }
        let slot = self
            .peers
            .iter()
            .map(|peer| peer.slot)
            .find(|&slot| self.current_step(slot).and_then(Command::opcode) == Some(opcode));
        match slot {
            Some(slot) => {
                warn!(
                    "Slot {}: command {:#06X} refused with status {:#04X}",
                    slot, opcode, status
                );
                self.step_failed(slot);
            }
            None => debug!("Command {:#06X} refused with status {:#04X}", opcode, status),
        }
    }

    pub(crate) fn on_disconnection_complete(&mut self, status: u8, handle: u16, reason: u8) {
        if status != status::SUCCESS {
            warn!("Disconnect of {:#06X} failed with status {:#04X}", handle, status);
            return;
        }
        match self.peers.find_by_handle(handle) {
            Some(slot) => {
                info!("Slot {}: disconnected (reason {:#04X})", slot, reason);
                self.release_peer(slot, false);
            }
            None => debug!("Disconnection of unknown handle {:#06X}", handle),
        }
    }

    // Pairing: accept everything, store nothing

    pub(crate) fn on_link_key_request(&mut self, bdaddr: BdAddr) {
        debug!("Link key request from {}, no stored key", bdaddr);
        self.tx
            .push(hci::command(op::LINK_KEY_NEG_REPLY, bdaddr.as_bytes()));
    }

    /// Wii sync convention: the PIN is the host address, or the remote's own
    /// address when ours is not known yet
    pub(crate) fn on_pin_code_request(&mut self, bdaddr: BdAddr) {
        let pin = self.local_bdaddr.unwrap_or(bdaddr);
        debug!("PIN code request from {}", bdaddr);
        let mut params = bdaddr.as_bytes().to_vec();
        params.push(PIN_LEN as u8);
        params.extend_from_slice(pin.as_bytes());
        params.resize(6 + 1 + 16, 0);
        self.tx.push(hci::command(op::PIN_CODE_REPLY, &params));
    }

    pub(crate) fn on_io_capability_request(&mut self, bdaddr: BdAddr) {
        let mut params = bdaddr.as_bytes().to_vec();
        // No OOB data, no MITM protection
        params.extend_from_slice(&[IO_CAPABILITY, 0x00, 0x00]);
        self.tx.push(hci::command(op::IO_CAPABILITY_REPLY, &params));
    }

    pub(crate) fn on_user_confirm_request(&mut self, bdaddr: BdAddr) {
        self.tx
            .push(hci::command(op::USER_CONFIRM_REPLY, bdaddr.as_bytes()));
    }

    pub(crate) fn on_link_key_notify(&mut self, bdaddr: BdAddr) {
        info!("New link key for {} (not stored)", bdaddr);
    }
}
