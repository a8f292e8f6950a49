//! Errors surfaced by the transport layer.

/// Errors that can occur while opening or using a byte transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying byte stream returned an I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes were returned than requested within the timeout.
    #[error("timeout: expected {expected} bytes, got {got}")]
    Timeout { expected: usize, got: usize },

    /// A `tcp:`/`serial:` URL did not match the expected grammar.
    #[error("invalid transport url: {0}")]
    InvalidUrl(String),

    /// The `serial` feature is disabled but a `serial:` URL was requested.
    #[error("serial transport support is not compiled in")]
    SerialUnsupported,
}
