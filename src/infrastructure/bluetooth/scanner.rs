//! Device discovery
//!
//! Inquiry results and inbound connection requests are the two ways a peer
//! gets a slot: inquiry makes us the initiator, a page from the peer makes
//! us the acceptor.

use crate::domain::models::BdAddr;
use crate::infrastructure::bluetooth::commands::{Arg, Command};
use crate::infrastructure::bluetooth::hci::{self, op, LINK_TYPE_ACL};
use crate::infrastructure::bluetooth::peers::ConnRole;
use crate::infrastructure::bluetooth::service::BluetoothHost;
use tracing::{debug, info, warn};

impl BluetoothHost {
    /// (Re)start the general inquiry
    pub fn start_inquiry(&self) {
        if let Some(frame) = Command::Inquiry.encode(Arg::None, &self.config) {
            info!("Starting inquiry");
            self.tx.push(frame);
        }
    }

    pub(crate) fn on_inquiry_complete(&mut self, status: u8) {
        debug!("Inquiry complete (status {:#04X})", status);
        if self.peers.is_empty() {
            self.start_inquiry();
        }
    }

    /// Take the first unknown device of the report and start paging it
    pub(crate) fn on_inquiry_result(&mut self, addrs: &[BdAddr]) {
        for addr in addrs {
            if self.peers.find_by_address(addr).is_some() {
                debug!("Inquiry result {} already tracked", addr);
                continue;
            }
            let slot = match self.peers.allocate(*addr, ConnRole::Initiator) {
                Ok(slot) => slot,
                Err(e) => {
                    warn!("Ignoring inquiry result {}: {}", addr, e);
                    return;
                }
            };
            info!("Found {} (slot {})", addr, slot);
            self.tx.push(hci::command(op::INQUIRY_CANCEL, &[]));
            self.issue_step(slot);
            return;
        }
    }

    pub(crate) fn on_connection_request(&mut self, bdaddr: BdAddr, class: [u8; 3], link_type: u8) {
        if link_type != LINK_TYPE_ACL {
            debug!("Ignoring non-ACL connection request from {}", bdaddr);
            return;
        }
        if self.peers.find_by_address(&bdaddr).is_some() {
            debug!("Connection request from tracked peer {}", bdaddr);
            return;
        }
        match self.peers.allocate(bdaddr, ConnRole::Acceptor) {
            Ok(slot) => {
                info!(
                    "Connection request from {} (class {:02X?}), slot {}",
                    bdaddr, class, slot
                );
                self.issue_step(slot);
            }
            Err(e) => warn!("Ignoring connection request from {}: {}", bdaddr, e),
        }
    }
}
