//! Transport Shim
//!
//! Single outbound path to the radio. Producers push complete H4 frames into
//! a bounded queue; one pump task hands them to the radio, one frame per send
//! credit. The radio returns the credit through [`ReadyFlag::set`].

use crate::infrastructure::bluetooth::error::{HostError, TxError};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, trace, warn};

/// Sink for outbound frames, implemented by the radio driver
pub trait Radio: Send + 'static {
    /// Start transmitting one frame. The driver calls [`ReadyFlag::set`] once
    /// it can take the next one.
    fn send_packet(&mut self, frame: &[u8]) -> Result<(), HostError>;
}

/// Single-credit "ready to send" flag shared between the radio and the pump
#[derive(Debug, Clone, Default)]
pub struct ReadyFlag {
    ready: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReadyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a send credit back (radio "ready to send" callback)
    pub fn set(&self) {
        self.ready.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Wait until a credit is available
    pub async fn wait(&self) {
        while !self.is_set() {
            self.notify.notified().await;
        }
    }
}

/// Producer side of the outbound queue
#[derive(Debug, Clone)]
pub struct TxQueue {
    sender: mpsc::Sender<Vec<u8>>,
}

impl TxQueue {
    /// Create a queue holding at most `capacity` frames
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue a frame without blocking
    pub fn send(&self, frame: Vec<u8>) -> Result<(), TxError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TxError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TxError::Closed,
        })
    }

    /// Enqueue a frame, dropping it with a warning when the queue refuses it
    pub fn push(&self, frame: Vec<u8>) {
        if let Err(e) = self.send(frame) {
            warn!("Dropping outbound frame: {}", e);
        }
    }
}

/// Log target of the H4 frame dumps, e.g. `RUST_LOG=info,h4=trace`
pub const FRAME_TRACE_TARGET: &str = "h4";

/// Frame direction, as written in the trace dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Self::Outbound => 'O',
            Self::Inbound => 'I',
        }
    }
}

/// Format a frame as a text2pcap compatible hex dump
pub fn h4_dump(frame: &[u8], direction: Direction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", direction.marker());
    for (row, chunk) in frame.chunks(16).enumerate() {
        let _ = write!(out, "{:06X}", row * 16);
        for byte in chunk {
            let _ = write!(out, " {:02X}", byte);
        }
        out.push('\n');
    }
    out
}

/// Dump a frame when the frame trace target is enabled
pub fn trace_frame(frame: &[u8], direction: Direction) {
    if tracing::enabled!(target: FRAME_TRACE_TARGET, tracing::Level::TRACE) {
        trace!(target: FRAME_TRACE_TARGET, "\n{}", h4_dump(frame, direction));
    }
}

/// Sender loop: the only code that touches the radio on the transmit side
pub struct TxPump<R: Radio> {
    receiver: mpsc::Receiver<Vec<u8>>,
    ready: ReadyFlag,
    radio: R,
}

impl<R: Radio> TxPump<R> {
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>, ready: ReadyFlag, radio: R) -> Self {
        Self {
            receiver,
            ready,
            radio,
        }
    }

    /// Send one frame. Returns `false` once every producer is gone.
    pub async fn pump_one(&mut self) -> bool {
        self.ready.wait().await;
        let Some(frame) = self.receiver.recv().await else {
            return false;
        };
        self.ready.clear();
        trace_frame(&frame, Direction::Outbound);

        if let Err(e) = self.radio.send_packet(&frame) {
            // The frame is lost; give the credit back so the queue keeps moving
            error!("Radio send failed: {}", e);
            self.ready.set();
        }
        true
    }

    pub async fn run(mut self) {
        info!("Transmit pump started");
        while self.pump_one().await {}
        info!("Transmit pump stopped: queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingRadio {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Radio for RecordingRadio {
        fn send_packet(&mut self, frame: &[u8]) -> Result<(), HostError> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_queue_full_at_capacity() {
        let (queue, _rx) = TxQueue::bounded(2);
        assert_eq!(queue.send(vec![1]), Ok(()));
        assert_eq!(queue.send(vec![2]), Ok(()));
        assert_eq!(queue.send(vec![3]), Err(TxError::QueueFull));
    }

    #[test]
    fn test_queue_closed() {
        let (queue, rx) = TxQueue::bounded(2);
        drop(rx);
        assert_eq!(queue.send(vec![1]), Err(TxError::Closed));
    }

    #[test]
    fn test_h4_dump_rows() {
        let frame: Vec<u8> = (0..18).collect();
        let dump = h4_dump(&frame, Direction::Outbound);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "O");
        assert!(lines[1].starts_with("000000 00 01 02"));
        assert_eq!(lines[2], "000010 10 11");
    }

    #[tokio::test]
    async fn test_one_frame_per_credit() {
        let (queue, rx) = TxQueue::bounded(4);
        let ready = ReadyFlag::new();
        let radio = RecordingRadio::default();
        let sent = radio.sent.clone();
        let mut pump = TxPump::new(rx, ready.clone(), radio);

        queue.send(vec![0x01, 0x03, 0x0C, 0x00]).unwrap();
        queue.send(vec![0x01, 0x01, 0x10, 0x00]).unwrap();

        ready.set();
        assert!(pump.pump_one().await);
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(!ready.is_set());

        // No credit: the second frame stays queued
        let blocked = tokio::time::timeout(Duration::from_millis(50), pump.pump_one()).await;
        assert!(blocked.is_err());
        assert_eq!(sent.lock().unwrap().len(), 1);

        ready.set();
        assert!(pump.pump_one().await);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], vec![0x01, 0x01, 0x10, 0x00]);
    }

    #[tokio::test]
    async fn test_pump_stops_when_producers_gone() {
        let (queue, rx) = TxQueue::bounded(1);
        let ready = ReadyFlag::new();
        ready.set();
        let mut pump = TxPump::new(rx, ready, RecordingRadio::default());
        drop(queue);
        assert!(!pump.pump_one().await);
    }
}
