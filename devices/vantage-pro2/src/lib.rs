//! Driver for the Davis Vantage Pro 2 weather console: wakes the console
//! over a [`vantage_core::Transport`], sequences its ASCII command set, and
//! decodes LOOP and archive (DMP) records via `vantage-protocol`.
//!
//! Rev A consoles (firmware predating 2002-04-24) are out of scope; opening
//! one returns [`DriverError::Unsupported`].

mod archive;
mod console;
mod error;

pub use archive::{ArchiveDownload, RecordStore};
pub use console::{Console, Diagnostics, LoopReading, Timezone};
pub use error::DriverError;

pub use vantage_core::{ConsoleConfig, Transport, parse_transport_url};
pub use vantage_protocol::{AlarmFlags, ArchiveRecord, LoopPacket};
