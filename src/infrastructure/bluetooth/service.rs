//! Bluetooth Host Service
//!
//! Owns all host state and dispatches every inbound frame. Runs on a single
//! task; all work triggered by a frame is done before `on_frame` returns and
//! outbound frames only ever go through the transmit queue.

use crate::domain::models::{BdAddr, ControllerState, HostEvent, SystemIdHandle};
use crate::domain::settings::HostSettings;
use crate::infrastructure::bluetooth::bringup::BringUp;
use crate::infrastructure::bluetooth::commands::Command;
use crate::infrastructure::bluetooth::hci::{op, AclPacket, HciEvent, PacketType};
use crate::infrastructure::bluetooth::l2cap::CID_SIGNALING;
use crate::infrastructure::bluetooth::peers::{ChannelKind, PeerTable};
use crate::infrastructure::bluetooth::transport::{trace_frame, Direction, TxQueue};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Bluetooth host: bring-up, discovery, connections, HID configuration
pub struct BluetoothHost {
    pub(crate) tx: TxQueue,
    pub(crate) peers: PeerTable,
    pub(crate) bringup: BringUp,
    pub(crate) local_bdaddr: Option<BdAddr>,
    pub(crate) config: HostSettings,
    pub(crate) events: mpsc::UnboundedSender<HostEvent>,
    pub(crate) system_id: SystemIdHandle,
}

impl BluetoothHost {
    pub fn new(
        config: HostSettings,
        tx: TxQueue,
        events: mpsc::UnboundedSender<HostEvent>,
        system_id: SystemIdHandle,
    ) -> Self {
        Self {
            tx,
            peers: PeerTable::new(),
            bringup: BringUp::new(),
            local_bdaddr: None,
            config,
            events,
            system_id,
        }
    }

    /// Reset the controller and run the bring-up sequence
    pub fn start(&mut self) {
        self.bringup.start(&self.tx, &self.config);
    }

    pub fn local_bdaddr(&self) -> Option<BdAddr> {
        self.local_bdaddr
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Radio receive callback: one complete H4 frame
    pub fn on_frame(&mut self, frame: &[u8]) {
        trace_frame(frame, Direction::Inbound);
        let Some((&kind, packet)) = frame.split_first() else {
            debug!("Dropping empty frame");
            return;
        };

        match PacketType::try_from(kind) {
            Ok(PacketType::Event) => match HciEvent::parse(packet) {
                Ok(event) => self.on_event(event),
                Err(e) => debug!("Dropping event: {}", e),
            },
            Ok(PacketType::Acl) => match AclPacket::parse(packet) {
                Ok(acl) => self.on_acl(acl),
                Err(e) => debug!("Dropping ACL packet: {}", e),
            },
            Ok(other) => debug!("Ignoring {:?} packet", other),
            Err(e) => debug!("Dropping frame: {}", e),
        }
    }

    fn on_event(&mut self, event: HciEvent<'_>) {
        match event {
            HciEvent::CommandComplete {
                opcode,
                status,
                params,
            } => {
                if opcode == op::READ_BD_ADDR && status == 0 {
                    if let Some(addr) = BdAddr::from_slice(params) {
                        info!("Local address {}", addr);
                        self.local_bdaddr = Some(addr);
                    }
                }
                let progress = self
                    .bringup
                    .on_command_complete(opcode, status, &self.tx, &self.config);
                trace!("Command {:#06X} complete: {:?}", opcode, progress);
            }
            HciEvent::CommandStatus { status, opcode } => self.on_command_status(status, opcode),
            HciEvent::InquiryComplete { status } => self.on_inquiry_complete(status),
            HciEvent::InquiryResult { addrs } => self.on_inquiry_result(&addrs),
            HciEvent::ConnectionComplete {
                status,
                handle,
                bdaddr,
                ..
            } => self.on_connection_complete(status, handle, bdaddr),
            HciEvent::ConnectionRequest {
                bdaddr,
                class,
                link_type,
            } => self.on_connection_request(bdaddr, class, link_type),
            HciEvent::DisconnectionComplete {
                status,
                handle,
                reason,
            } => self.on_disconnection_complete(status, handle, reason),
            HciEvent::RemoteNameComplete {
                status,
                bdaddr,
                name,
            } => self.on_remote_name(status, bdaddr, name),
            HciEvent::RemoteFeatures { status, handle } => {
                self.on_handle_step(handle, Command::ReadRemoteFeatures, status)
            }
            HciEvent::RemoteExtFeatures { status, handle } => {
                self.on_handle_step(handle, Command::ReadRemoteExtFeatures, status)
            }
            HciEvent::AuthenticationComplete { status, handle } => {
                self.on_handle_step(handle, Command::AuthRequested, status)
            }
            HciEvent::EncryptionChange {
                status,
                handle,
                enabled,
            } => self.on_encryption_change(status, handle, enabled),
            HciEvent::PinCodeRequest { bdaddr } => self.on_pin_code_request(bdaddr),
            HciEvent::LinkKeyRequest { bdaddr } => self.on_link_key_request(bdaddr),
            HciEvent::LinkKeyNotify { bdaddr } => self.on_link_key_notify(bdaddr),
            HciEvent::IoCapabilityRequest { bdaddr } => self.on_io_capability_request(bdaddr),
            HciEvent::UserConfirmRequest { bdaddr } => self.on_user_confirm_request(bdaddr),
            HciEvent::Other { code } => debug!("Unhandled event {:#04X}", code),
        }
    }

    fn on_acl(&mut self, acl: AclPacket<'_>) {
        if acl.boundary == 0x01 {
            debug!("Dropping ACL continuation fragment on {:#06X}", acl.handle);
            return;
        }
        if acl.cid == CID_SIGNALING {
            self.on_signaling(acl.handle, acl.payload);
            return;
        }
        match self.peers.find_by_channel_id(acl.cid) {
            Some((slot, ChannelKind::HidInterrupt)) => self.on_hid_interrupt(slot, acl.payload),
            Some((slot, kind)) => {
                debug!("Slot {}: {} bytes on {:?} channel", slot, acl.payload.len(), kind)
            }
            None => debug!("Dropping data for unknown channel {:#06X}", acl.cid),
        }
    }

    /// Forward normalised input to the output side
    pub(crate) fn emit_input(&self, slot: usize, state: ControllerState) {
        let device = self.peers.get(slot).and_then(|p| p.device_type);
        let _ = self.events.send(HostEvent::Input {
            slot,
            device,
            system: self.system_id.get(),
            state,
        });
    }
}
