use vantage_core::TransportError;
use vantage_protocol::ProtocolError;

/// Errors from driving a Vantage Pro 2 console.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("console did not wake up after {attempts} attempts")]
    NoDevice { attempts: u8 },

    #[error("console rejected command {command:?} after {attempts} attempts")]
    BadAck { command: String, attempts: u8 },

    #[error("archive download cancelled after page {page}")]
    Cancelled { page: u16 },

    #[error("firmware revision A consoles are not supported (firmware date {0})")]
    Unsupported(chrono::NaiveDate),

    #[error("console reported NACK for command {0:?}")]
    Nack(String),
}
