use thiserror::Error;

/// Errors raised while decoding inbound frames or talking to the radio
#[derive(Debug, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("packet type ({0:#04X}) is not handled")]
    UnknownPacketType(u8),
    #[error("{what} truncated: {len} bytes")]
    Truncated { what: &'static str, len: usize },
    #[error("radio rejected frame: {0}")]
    Radio(String),
}

/// Outbound queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("outbound queue full")]
    QueueFull,
    #[error("outbound queue closed")]
    Closed,
}

/// All seven peer slots are occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no free peer slot")]
pub struct PeerTableFull;

/// Check that `bytes` holds at least `len` bytes before indexing into it
pub(crate) fn need(what: &'static str, bytes: &[u8], len: usize) -> Result<(), HostError> {
    if bytes.len() < len {
        Err(HostError::Truncated {
            what,
            len: bytes.len(),
        })
    } else {
        Ok(())
    }
}
