//! Wire format for the Davis Vantage Pro 2 serial/TCP console protocol:
//! CRC framing, the LOOP and archive record layouts, and packed datetimes.
//!
//! This crate has no I/O of its own — it only encodes and decodes byte
//! buffers. [`vantage_core::Transport`] moves the bytes; `vantage-pro2`
//! sequences the commands.

mod alarms;
mod crc;
mod datetime;
mod error;
mod frames;

pub use alarms::{AlarmExTempHum, AlarmFlags, AlarmIn, AlarmOut, AlarmRain, AlarmSoilLeaf};
pub use crc::{append as crc_append, crc16, verify as crc_verify};
pub use datetime::{pack_datetime, pack_dmp_date_time, unpack_datetime, unpack_dmp_date_time};
pub use error::ProtocolError;
pub use frames::{ArchiveRecord, DmpHeader, DmpPage, LoopPacket};
