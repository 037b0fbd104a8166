//! Controller bring-up sequencer
//!
//! Walks [`BRING_UP`] one command at a time. Each command complete for the
//! current step moves the sequence on; repeated failures start over from
//! reset.

use crate::domain::settings::HostSettings;
use crate::infrastructure::bluetooth::commands::{Arg, Command, BRING_UP};
use crate::infrastructure::bluetooth::hci::status;
use crate::infrastructure::bluetooth::peers::MAX_RETRY;
use crate::infrastructure::bluetooth::transport::TxQueue;
use tracing::{debug, error, info, warn};

/// Outcome of feeding a command complete to the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Not the current step's opcode
    Ignored,
    Advanced,
    Retried,
    /// Retries exhausted, sequence restarted at reset
    Restarted,
    /// Last command (inquiry) issued
    Finished,
}

#[derive(Debug, Default)]
pub struct BringUp {
    index: usize,
    retry: u8,
}

impl BringUp {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start from the controller reset
    pub fn start(&mut self, tx: &TxQueue, cfg: &HostSettings) {
        info!("Starting controller bring-up");
        self.index = 0;
        self.retry = 0;
        self.issue(tx, cfg);
    }

    fn issue(&self, tx: &TxQueue, cfg: &HostSettings) {
        let Some(command) = self.current() else {
            return;
        };
        match command.encode(Arg::None, cfg) {
            Some(frame) => {
                debug!("Bring-up step {}: {:?}", self.index, command);
                tx.push(frame);
            }
            None => error!("Bring-up command {:?} could not be encoded", command),
        }
    }

    pub fn current(&self) -> Option<Command> {
        BRING_UP.get(self.index).map(|entry| entry.command)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn retry(&self) -> u8 {
        self.retry
    }

    /// The last entry (inquiry) has been issued. The index stays on it; the
    /// inquiry is answered by a command status only.
    pub fn is_done(&self) -> bool {
        self.index + 1 >= BRING_UP.len()
    }

    pub fn on_command_complete(
        &mut self,
        opcode: u16,
        status: u8,
        tx: &TxQueue,
        cfg: &HostSettings,
    ) -> Progress {
        if self.is_done() {
            return Progress::Ignored;
        }
        let Some(current) = self.current() else {
            return Progress::Ignored;
        };
        if current.opcode() != Some(opcode) {
            return Progress::Ignored;
        }

        if status != status::SUCCESS && status != status::UNKNOWN_COMMAND {
            self.retry += 1;
            if self.retry > MAX_RETRY {
                warn!(
                    "Bring-up step {} ({:?}) failed {} times, restarting",
                    self.index, current, self.retry
                );
                self.start(tx, cfg);
                return Progress::Restarted;
            }
            warn!(
                "Bring-up step {} ({:?}) failed with status {:#04X}, retry {}",
                self.index, current, status, self.retry
            );
            self.issue(tx, cfg);
            return Progress::Retried;
        }

        self.retry = 0;
        self.index += 1;
        self.issue(tx, cfg);

        if self.is_done() {
            info!("Controller bring-up complete, inquiry started");
            return Progress::Finished;
        }
        Progress::Advanced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::hci::op;

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn opcode_of(frame: &[u8]) -> u16 {
        u16::from_le_bytes([frame[1], frame[2]])
    }

    #[test]
    fn test_full_sequence_ends_with_inquiry() {
        let cfg = HostSettings::default();
        let (tx, mut rx) = TxQueue::bounded(64);
        let mut bringup = BringUp::new();
        bringup.start(&tx, &cfg);

        let mut issued = drain(&mut rx);
        assert_eq!(issued.len(), 1);
        assert_eq!(opcode_of(&issued[0]), op::RESET);

        let mut last_index = bringup.index();
        while !bringup.is_done() {
            let opcode = opcode_of(issued.last().unwrap());
            let progress = bringup.on_command_complete(opcode, 0x00, &tx, &cfg);
            assert!(matches!(progress, Progress::Advanced | Progress::Finished));
            assert_eq!(bringup.index(), last_index + 1);
            last_index = bringup.index();
            issued = drain(&mut rx);
            assert_eq!(issued.len(), 1);
        }
        assert_eq!(opcode_of(&issued[0]), op::INQUIRY);
        assert_eq!(bringup.index(), BRING_UP.len() - 1);
        assert_eq!(bringup.current(), Some(Command::Inquiry));

        // Nothing moves past the running inquiry
        assert_eq!(
            bringup.on_command_complete(op::INQUIRY, 0x00, &tx, &cfg),
            Progress::Ignored
        );
        assert_eq!(bringup.index(), BRING_UP.len() - 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_fourth_failure_restarts_at_reset() {
        let cfg = HostSettings::default();
        let (tx, mut rx) = TxQueue::bounded(64);
        let mut bringup = BringUp::new();
        bringup.start(&tx, &cfg);
        bringup.on_command_complete(op::RESET, 0x00, &tx, &cfg);
        bringup.on_command_complete(op::READ_LOCAL_FEATURES, 0x00, &tx, &cfg);
        assert_eq!(bringup.index(), 2);
        drain(&mut rx);

        for _ in 0..3 {
            let progress =
                bringup.on_command_complete(op::READ_LOCAL_VERSION_INFO, 0x0C, &tx, &cfg);
            assert_eq!(progress, Progress::Retried);
            assert_eq!(bringup.index(), 2);
            let frames = drain(&mut rx);
            assert_eq!(opcode_of(&frames[0]), op::READ_LOCAL_VERSION_INFO);
        }

        let progress = bringup.on_command_complete(op::READ_LOCAL_VERSION_INFO, 0x0C, &tx, &cfg);
        assert_eq!(progress, Progress::Restarted);
        assert_eq!(bringup.index(), 0);
        assert_eq!(bringup.retry(), 0);
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(opcode_of(&frames[0]), op::RESET);
    }

    #[test]
    fn test_unknown_command_counts_as_success() {
        let cfg = HostSettings::default();
        let (tx, _rx) = TxQueue::bounded(64);
        let mut bringup = BringUp::new();
        bringup.start(&tx, &cfg);
        assert_eq!(
            bringup.on_command_complete(op::RESET, status::UNKNOWN_COMMAND, &tx, &cfg),
            Progress::Advanced
        );
        assert_eq!(bringup.index(), 1);
    }

    #[test]
    fn test_unrelated_opcode_ignored() {
        let cfg = HostSettings::default();
        let (tx, mut rx) = TxQueue::bounded(64);
        let mut bringup = BringUp::new();
        bringup.start(&tx, &cfg);
        drain(&mut rx);
        assert_eq!(
            bringup.on_command_complete(op::READ_BD_ADDR, 0x00, &tx, &cfg),
            Progress::Ignored
        );
        assert_eq!(bringup.index(), 0);
        assert!(drain(&mut rx).is_empty());
    }
}
