//! Transport abstraction for byte-oriented weather console links.
//!
//! This crate provides:
//! - The [`Transport`] trait that the protocol and driver crates consume
//! - Default [`TcpTransport`] and [`SerialTransport`] implementations
//! - A `tcp:`/`serial:` URL grammar for constructing a transport from a string
//! - [`ConsoleConfig`], a `serde`-backed convenience type for embedders

mod config;
mod error;
mod tcp;
mod transport;
mod url;

#[cfg(feature = "serial")]
mod serial;

pub use config::ConsoleConfig;
pub use error::TransportError;
pub use tcp::TcpTransport;
pub use transport::Transport;
pub use url::parse_transport_url;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;
