//! Wii HID configuration sequencer
//!
//! Runs once the HID interrupt channel is open: asks for a status report,
//! probes the extension port when needed, then sets the player LEDs and the
//! reporting mode. Writes wait for their acknowledgement and the identifier
//! read waits for its data; everything else is fire-and-forget.

use crate::domain::classify;
use crate::domain::models::{DeviceType, HostEvent};
use crate::infrastructure::bluetooth::hci;
use crate::infrastructure::bluetooth::peers::{ChannelKind, ChannelPhase, Peer};
use crate::infrastructure::bluetooth::protocol::{
    self, extension, report, InputReport, OutputReport, DEFAULT_REPORT_MODE,
    STATUS_EXTENSION_CONNECTED,
};
use crate::infrastructure::bluetooth::service::BluetoothHost;
use crate::infrastructure::bluetooth::transport::TxQueue;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidStep {
    EnableExtension,
    FinalizeExtension,
    ReadExtensionId,
    SetLeds,
    SetReportMode,
}

/// Reply that must arrive before the sequence moves on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Awaiting {
    WriteAck,
    ReadData,
}

impl HidStep {
    fn report(self, led_pattern: u8) -> OutputReport {
        match self {
            Self::EnableExtension => OutputReport::WriteRegister {
                address: extension::ENABLE,
                value: 0x55,
            },
            Self::FinalizeExtension => OutputReport::WriteRegister {
                address: extension::FINALIZE,
                value: 0x00,
            },
            Self::ReadExtensionId => OutputReport::ReadRegister {
                address: extension::ID,
                size: extension::ID_LEN,
            },
            Self::SetLeds => OutputReport::SetLeds(led_pattern),
            Self::SetReportMode => OutputReport::SetReportMode(DEFAULT_REPORT_MODE),
        }
    }

    fn awaiting(self) -> Option<Awaiting> {
        match self {
            Self::EnableExtension | Self::FinalizeExtension => Some(Awaiting::WriteAck),
            Self::ReadExtensionId => Some(Awaiting::ReadData),
            Self::SetLeds | Self::SetReportMode => None,
        }
    }
}

/// Extension present (or type unknown): identify it first
pub const WII_EXT_CONF: &[HidStep] = &[
    HidStep::EnableExtension,
    HidStep::FinalizeExtension,
    HidStep::ReadExtensionId,
    HidStep::SetLeds,
    HidStep::SetReportMode,
];

/// Bare Wii Remote
pub const WII_CORE_CONF: &[HidStep] = &[HidStep::SetLeds, HidStep::SetReportMode];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HidPhase {
    /// Interrupt channel closed, status pending, or identification stopped
    #[default]
    Idle,
    Configuring {
        sequence: &'static [HidStep],
        step: usize,
        awaiting: Option<Awaiting>,
    },
    /// Streaming input reports
    Ready,
}

/// Whether a status report calls for the extension probe
fn needs_identification(device: Option<DeviceType>, ext_connected: bool) -> bool {
    !(device == Some(DeviceType::WiiCore) && !ext_connected)
}

fn send_report(tx: &TxQueue, peer: &Peer, out: OutputReport) {
    let Some(handle) = peer.handle else {
        warn!("Slot {}: no link for HID report {:02X}", peer.slot, out.id());
        return;
    };
    let channel = peer.channel(ChannelKind::HidInterrupt);
    if channel.phase != ChannelPhase::Open {
        debug!(
            "Slot {}: HID interrupt channel not open, dropping report {:02X}",
            peer.slot,
            out.id()
        );
        return;
    }
    trace!("Slot {}: HID output {:?}", peer.slot, out);
    tx.push(hci::acl(handle, channel.remote_id, &out.to_bytes()));
}

impl BluetoothHost {
    /// HID interrupt channel is open
    pub(crate) fn hid_start(&mut self, slot: usize) {
        let led_pattern = self.led_pattern(slot);
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        match peer.device_type {
            Some(device) if !device.is_wii_family() => {
                info!("Slot {}: {:?}, setting player LEDs only", slot, device);
                send_report(&self.tx, peer, OutputReport::SetLeds(led_pattern));
                self.hid_ready(slot);
            }
            device => {
                debug!("Slot {}: {:?}, requesting status", slot, device);
                peer.hid = HidPhase::Idle;
                send_report(&self.tx, peer, OutputReport::StatusRequest);
            }
        }
    }

    /// Data received on a peer's HID interrupt channel
    pub(crate) fn on_hid_interrupt(&mut self, slot: usize, payload: &[u8]) {
        let Some(peer) = self.peers.get(slot) else {
            return;
        };
        if peer.channel(ChannelKind::HidInterrupt).phase != ChannelPhase::Open {
            debug!("Slot {}: HID data before the channel is open, dropped", slot);
            return;
        }
        let wii = peer.device_type.map_or(true, DeviceType::is_wii_family);
        let ready = peer.hid == HidPhase::Ready;
        if !wii {
            if ready {
                if let Some(state) = protocol::raw_state(payload) {
                    self.emit_input(slot, state);
                }
            }
            return;
        }

        let parsed = match InputReport::parse(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Slot {}: dropping HID payload: {}", slot, e);
                return;
            }
        };

        match parsed {
            InputReport::Status { flags } => self.on_status(slot, flags),
            InputReport::Ack { report, error } => self.on_ack(slot, report, error),
            InputReport::ReadData { error, data, .. } => self.on_read_data(slot, error, data),
            InputReport::Data(state) => {
                if ready {
                    self.emit_input(slot, state);
                } else {
                    trace!("Slot {}: input before configuration, dropped", slot);
                }
            }
            InputReport::Other { report_id } => {
                debug!("Slot {}: unhandled HID report {:02X}", slot, report_id)
            }
        }
    }

    fn on_status(&mut self, slot: usize, flags: u8) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        if peer.device_type.is_none() {
            peer.device_type = Some(DeviceType::WiiCore);
        }
        peer.ext_connected = flags & STATUS_EXTENSION_CONNECTED != 0;

        let sequence = if needs_identification(peer.device_type, peer.ext_connected) {
            WII_EXT_CONF
        } else {
            WII_CORE_CONF
        };
        info!(
            "Slot {}: status, extension {}, configuring",
            slot,
            if peer.ext_connected { "connected" } else { "absent" }
        );
        peer.hid = HidPhase::Configuring {
            sequence,
            step: 0,
            awaiting: None,
        };
        self.hid_advance(slot);
    }

    fn on_ack(&mut self, slot: usize, report: u8, error: u8) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        if error != 0 {
            warn!(
                "Slot {}: report {:02X} acknowledged with error {:02X}",
                slot, report, error
            );
        }
        if report != report::WRITE_MEMORY {
            return;
        }
        if let HidPhase::Configuring {
            step,
            awaiting: awaiting @ Some(Awaiting::WriteAck),
            ..
        } = &mut peer.hid
        {
            *awaiting = None;
            *step += 1;
            self.hid_advance(slot);
        }
    }

    fn on_read_data(&mut self, slot: usize, error: u8, data: &[u8]) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        let HidPhase::Configuring {
            step,
            awaiting: awaiting @ Some(Awaiting::ReadData),
            ..
        } = &mut peer.hid
        else {
            debug!("Slot {}: unexpected read data", slot);
            return;
        };

        if error != 0 {
            info!("Slot {}: no extension (read error {:X})", slot, error);
            peer.device_type = Some(DeviceType::WiiCore);
        } else if let Some(device) = classify::type_from_extension(data) {
            info!("Slot {}: extension identified as {:?}", slot, device);
            peer.device_type = Some(device);
        } else {
            warn!("Slot {}: unknown extension {:02X?}", slot, data);
            peer.device_type = None;
            peer.hid = HidPhase::Idle;
            return;
        }
        *awaiting = None;
        *step += 1;
        self.hid_advance(slot);
    }

    /// Issue steps until one needs a reply or the sequence ends
    fn hid_advance(&mut self, slot: usize) {
        let led_pattern = self.led_pattern(slot);
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        loop {
            let HidPhase::Configuring { sequence, step, .. } = peer.hid else {
                return;
            };
            let Some(&next) = sequence.get(step) else {
                break;
            };
            send_report(&self.tx, peer, next.report(led_pattern));
            let awaiting = next.awaiting();
            peer.hid = HidPhase::Configuring {
                sequence,
                step: if awaiting.is_some() { step } else { step + 1 },
                awaiting,
            };
            if awaiting.is_some() {
                return;
            }
        }
        self.hid_ready(slot);
    }

    fn led_pattern(&self, slot: usize) -> u8 {
        self.config.led_patterns.get(slot).copied().unwrap_or(0)
    }

    fn hid_ready(&mut self, slot: usize) {
        let Some(peer) = self.peers.get_mut(slot) else {
            return;
        };
        peer.hid = HidPhase::Ready;
        info!(
            "Slot {}: {:?} ready (encrypted: {})",
            slot, peer.device_type, peer.encrypted
        );
        let _ = self.events.send(HostEvent::PeerReady {
            slot,
            bdaddr: peer.bdaddr,
            device: peer.device_type,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BdAddr;
    use crate::infrastructure::bluetooth::peers::{ConnRole, PeerTable};

    #[test]
    fn test_identification_rule() {
        assert!(!needs_identification(Some(DeviceType::WiiCore), false));
        assert!(needs_identification(Some(DeviceType::WiiCore), true));
        assert!(needs_identification(Some(DeviceType::WiiNunchuck), false));
        assert!(needs_identification(Some(DeviceType::WiiUPro), false));
        assert!(needs_identification(None, false));
    }

    #[test]
    fn test_step_reports() {
        assert_eq!(
            HidStep::EnableExtension.report(1).to_bytes()[..8],
            [0xA2, 0x16, 0x04, 0xA4, 0x00, 0xF0, 0x01, 0x55]
        );
        assert_eq!(
            HidStep::FinalizeExtension.report(1).to_bytes()[..8],
            [0xA2, 0x16, 0x04, 0xA4, 0x00, 0xFB, 0x01, 0x00]
        );
        assert_eq!(HidStep::SetLeds.report(0x4).to_bytes(), vec![0xA2, 0x11, 0x40]);
        assert_eq!(HidStep::SetLeds.awaiting(), None);
        assert_eq!(HidStep::ReadExtensionId.awaiting(), Some(Awaiting::ReadData));
    }

    #[test]
    fn test_report_waits_for_open_channel() {
        let (tx, mut rx) = TxQueue::bounded(4);
        let mut table = PeerTable::new();
        let slot = table
            .allocate(BdAddr([1, 2, 3, 4, 5, 6]), ConnRole::Initiator)
            .unwrap();
        let peer = table.get_mut(slot).unwrap();
        peer.handle = Some(0x000B);

        send_report(&tx, peer, OutputReport::StatusRequest);
        assert!(rx.try_recv().is_err());

        let channel = peer.channel_mut(ChannelKind::HidInterrupt);
        channel.phase = ChannelPhase::Open;
        channel.remote_id = 0x0042;
        send_report(&tx, peer, OutputReport::StatusRequest);
        let frame = rx.try_recv().unwrap();
        let acl = hci::AclPacket::parse(&frame[1..]).unwrap();
        assert_eq!(acl.cid, 0x0042);
        assert_eq!(acl.payload, &[0xA2, 0x15, 0x00]);
    }
}
