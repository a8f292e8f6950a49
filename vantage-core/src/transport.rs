//! Core [`Transport`] trait.

use std::time::Duration;

use crate::error::TransportError;

/// Blocking byte stream contract consumed by the protocol controller.
///
/// Implementations must treat a short read (fewer than `n` bytes returned
/// within the timeout) as [`TransportError::Timeout`] rather than returning
/// a partial buffer: the protocol layer never has to reason about partial
/// frames.
pub trait Transport: Send {
    /// Write `bytes` to the link. Binary payloads are written verbatim;
    /// callers are responsible for appending command terminators.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `n` bytes, waiting up to `timeout` (or the
    /// transport's configured default timeout if `None`).
    fn read(&mut self, n: usize, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError>;

    /// Change the transport's default read timeout.
    fn set_timeout(&mut self, timeout: Duration);

    /// Release the underlying connection. Safe to call more than once.
    fn close(&mut self) -> Result<(), TransportError>;
}
