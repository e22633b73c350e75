// Error kinds - one-to-one with spec.md §7.

use thiserror::Error;

/// Errors surfaced by the So-Fi modem.
///
/// `CrcMismatch` and `QueueOverflow` are recovered internally (a corrupt
/// frame or a full receive queue is logged and dropped, never returned from
/// `Modem::recv`/`Modem::send`); the variants exist so `codec::decode` and
/// the demodulator have named error types to test against directly.
#[derive(Debug, Error)]
pub enum SofiError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("receive queue overflow")]
    QueueOverflow,

    #[error("modem was destroyed")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PartialEq for SofiError {
    fn eq(&self, other: &Self) -> bool {
        use SofiError::*;
        match (self, other) {
            (ConfigInvalid(a), ConfigInvalid(b)) => a == b,
            (ResourceUnavailable(a), ResourceUnavailable(b)) => a == b,
            (CrcMismatch, CrcMismatch) => true,
            (QueueOverflow, QueueOverflow) => true,
            (Cancelled, Cancelled) => true,
            _ => false,
        }
    }
}
