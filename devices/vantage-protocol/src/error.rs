/// Errors decoding or encoding a console wire frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame too short: expected at least {expected} bytes, got {got}")]
    ShortFrame { expected: usize, got: usize },

    #[error("CRC mismatch decoding {what}")]
    BadCrc { what: &'static str },

    #[error("unsupported record type {0}")]
    UnknownRecordType(u8),

    #[error("packed datetime {0:#06x}/{1:#06x} is out of range")]
    InvalidDateTime(u16, u16),
}
