//! Protocol controller: wakes the console, sequences ASCII commands, and
//! checks the ACK/NAK/ESC tokens the console replies with.

use std::fmt;
use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use once_cell::unsync::OnceCell;
use vantage_core::{ConsoleConfig, Transport, parse_transport_url};
use vantage_protocol::LoopPacket;

use crate::error::DriverError;

const WAKE_STR: &[u8] = b"\n";
const WAKE_ACK: &[u8] = b"\n\r";
const ACK: u8 = 0x06;
pub(crate) const NACK: u8 = 0x21;
pub(crate) const CANCEL: u8 = 0x18;
pub(crate) const ESC: u8 = 0x1b;
const OK_BANNER: &[u8] = b"\n\rOK\n\r";

const WAKE_RETRY_DELAY: Duration = Duration::from_secs(1);
const COMMAND_RETRY_DELAY: Duration = Duration::from_millis(500);

fn rev_b_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2002, 4, 24).expect("2002-04-24 is a valid date")
}

/// The console's EEPROM timezone setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Localtime,
    Gmt { offset_hundredths: u16 },
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Localtime => write!(f, "Localtime"),
            Timezone::Gmt { offset_hundredths } => {
                write!(f, "GMT+{}", *offset_hundredths as f64 / 100.0)
            },
        }
    }
}

/// One LOOP read, stamped with the host wall-clock time it was received at
/// (the console itself carries no notion of "now" in this reply).
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReading {
    pub packet: LoopPacket,
    pub read_at: DateTime<Local>,
}

/// Diagnostics counters reported by `RXCHECK`, accumulated since midnight or
/// since last manually cleared on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub total_received: u32,
    pub total_missed: u32,
    pub resync_count: u32,
    pub max_received_in_row: u32,
    pub crc_errors: u32,
}

/// A live connection to a Vantage Pro 2 console.
pub struct Console {
    transport: Box<dyn Transport>,
    wake_retries: u8,
    command_retries: u8,
    timeout: Duration,
    firmware_date: OnceCell<NaiveDate>,
    firmware_version: OnceCell<String>,
    archive_period: OnceCell<u8>,
    timezone: OnceCell<Timezone>,
}

impl Console {
    /// Open a console over an already-constructed transport. Immediately
    /// probes the firmware date; Rev A consoles are rejected here, before
    /// any further wire traffic.
    pub fn open(transport: Box<dyn Transport>) -> Result<Self, DriverError> {
        Self::open_with_retries(transport, 3, 3)
    }

    pub fn open_with_retries(
        transport: Box<dyn Transport>,
        wake_retries: u8,
        command_retries: u8,
    ) -> Result<Self, DriverError> {
        Self::open_full(transport, wake_retries, command_retries, Duration::from_secs(10))
    }

    fn open_full(
        transport: Box<dyn Transport>,
        wake_retries: u8,
        command_retries: u8,
        timeout: Duration,
    ) -> Result<Self, DriverError> {
        let mut console = Self {
            transport,
            wake_retries,
            command_retries,
            timeout,
            firmware_date: OnceCell::new(),
            firmware_version: OnceCell::new(),
            archive_period: OnceCell::new(),
            timezone: OnceCell::new(),
        };
        let date = console.firmware_date()?;
        if date < rev_b_cutoff() {
            return Err(DriverError::Unsupported(date));
        }
        Ok(console)
    }

    /// Open a console from a saved [`ConsoleConfig`].
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, DriverError> {
        let mut transport = parse_transport_url(&config.transport_url)?;
        transport.set_timeout(config.timeout);
        Self::open_full(
            transport,
            config.wake_retries,
            config.command_retries,
            config.timeout,
        )
    }

    /// Doubled read timeout used to await the DMPAFT header, per the
    /// protocol's slower response for that exchange.
    pub(crate) fn doubled_timeout(&self) -> Duration {
        (self.timeout * 2).max(Duration::from_secs(2))
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Send the wake-up byte and wait for the console to echo it back,
    /// retrying up to `wake_retries` times with a 1 second delay.
    pub(crate) fn wake_up(&mut self) -> Result<(), DriverError> {
        for attempt in 1..=self.wake_retries {
            self.transport.write(WAKE_STR)?;
            if let Ok(reply) = self.transport.read(WAKE_ACK.len(), None) {
                if reply == WAKE_ACK {
                    log::debug!("console woke on attempt {attempt}");
                    return Ok(());
                }
            }
            log::warn!("wake attempt {attempt}/{} got no ack", self.wake_retries);
            if attempt < self.wake_retries {
                sleep(WAKE_RETRY_DELAY);
            }
        }
        Err(DriverError::NoDevice {
            attempts: self.wake_retries,
        })
    }

    pub(crate) fn read_ack(&mut self) -> Result<bool, DriverError> {
        let reply = self.transport.read(1, None)?;
        Ok(reply.first() == Some(&ACK))
    }

    /// Wake, send an ASCII command, and expect a single ACK byte back.
    /// Retries the whole wake+send+check cycle on failure.
    fn command_ack(&mut self, command: &str) -> Result<(), DriverError> {
        for attempt in 1..=self.command_retries {
            self.wake_up()?;
            self.transport.write(format!("{command}\n").as_bytes())?;
            if self.read_ack().unwrap_or(false) {
                return Ok(());
            }
            if attempt < self.command_retries {
                sleep(COMMAND_RETRY_DELAY);
            }
        }
        Err(DriverError::BadAck {
            command: command.to_string(),
            attempts: self.command_retries,
        })
    }

    /// Wake, send an ASCII command, and expect the `\n\rOK\n\r` banner.
    fn command_ok(&mut self, command: &str) -> Result<(), DriverError> {
        for attempt in 1..=self.command_retries {
            self.wake_up()?;
            self.transport.write(format!("{command}\n").as_bytes())?;
            if let Ok(reply) = self.transport.read(OK_BANNER.len(), None) {
                if reply == OK_BANNER {
                    return Ok(());
                }
            }
            if attempt < self.command_retries {
                sleep(COMMAND_RETRY_DELAY);
            }
        }
        Err(DriverError::BadAck {
            command: command.to_string(),
            attempts: self.command_retries,
        })
    }

    fn read_until_crlf(&mut self, max_len: usize) -> Result<Vec<u8>, DriverError> {
        let mut buf = Vec::new();
        while buf.len() < max_len {
            let byte = self.transport.read(1, None)?;
            buf.extend_from_slice(&byte);
            if buf.ends_with(b"\n\r") {
                break;
            }
        }
        Ok(buf)
    }

    /// EEPROM block read: `EEBRD <hex addr> <size>`, CRC-checked reply.
    fn eebrd(&mut self, address: u16, size: u8) -> Result<Vec<u8>, DriverError> {
        let command = format!("EEBRD {address:02X} {size}");
        for attempt in 1..=self.command_retries {
            self.wake_up()?;
            self.transport.write(format!("{command}\n").as_bytes())?;
            if !self.read_ack().unwrap_or(false) {
                if attempt < self.command_retries {
                    sleep(COMMAND_RETRY_DELAY);
                }
                continue;
            }
            let reply = self.transport.read(size as usize + 2, None);
            match reply {
                Ok(bytes) if vantage_protocol::crc_verify(&bytes) => {
                    return Ok(bytes[..size as usize].to_vec());
                },
                Ok(_) => {
                    log::warn!("{command} reply failed CRC on attempt {attempt}");
                    if attempt < self.command_retries {
                        sleep(COMMAND_RETRY_DELAY);
                    }
                },
                Err(_) => {
                    if attempt < self.command_retries {
                        sleep(COMMAND_RETRY_DELAY);
                    }
                },
            }
        }
        Err(DriverError::BadAck {
            command,
            attempts: self.command_retries,
        })
    }

    /// Firmware date code, from `VER`. Cached for the handle's lifetime.
    pub fn firmware_date(&mut self) -> Result<NaiveDate, DriverError> {
        if let Some(date) = self.firmware_date.get() {
            return Ok(*date);
        }
        self.command_ok("VER")?;
        let raw = self.transport.read(13, None)?;
        let text = String::from_utf8_lossy(&raw);
        let date = NaiveDate::parse_from_str(text.trim_end_matches(['\n', '\r']), "%b %d %Y")
            .map_err(|_| DriverError::Unsupported(rev_b_cutoff()))?;
        Ok(*self.firmware_date.get_or_init(|| date))
    }

    /// Firmware version string, from `NVER`. Cached for the handle's lifetime.
    pub fn firmware_version(&mut self) -> Result<&str, DriverError> {
        if self.firmware_version.get().is_none() {
            self.command_ok("NVER")?;
            let raw = self.read_until_crlf(64)?;
            let version = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            let _ = self.firmware_version.set(version);
        }
        Ok(self.firmware_version.get().unwrap())
    }

    /// Archive sampling period in minutes, from EEPROM address 0x2D.
    /// Cached for the handle's lifetime.
    pub fn archive_period(&mut self) -> Result<u8, DriverError> {
        if let Some(period) = self.archive_period.get() {
            return Ok(*period);
        }
        let bytes = self.eebrd(0x2d, 1)?;
        Ok(*self.archive_period.get_or_init(|| bytes[0]))
    }

    /// Console timezone setting, from EEPROM address 0x14.
    /// Cached for the handle's lifetime.
    pub fn timezone(&mut self) -> Result<Timezone, DriverError> {
        if let Some(tz) = self.timezone.get() {
            return Ok(*tz);
        }
        let bytes = self.eebrd(0x14, 3)?;
        let offset = u16::from_le_bytes([bytes[0], bytes[1]]);
        let gmt_flag = bytes[2];
        let tz = if gmt_flag == 1 {
            Timezone::Gmt {
                offset_hundredths: offset,
            }
        } else {
            Timezone::Localtime
        };
        Ok(*self.timezone.get_or_init(|| tz))
    }

    /// Console diagnostics counters, from `RXCHECK`.
    pub fn diagnostics(&mut self) -> Result<Diagnostics, DriverError> {
        self.command_ok("RXCHECK")?;
        let raw = self.read_until_crlf(128)?;
        let text = String::from_utf8_lossy(&raw);
        let values: Vec<u32> = text
            .trim_end_matches(['\n', '\r'])
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if values.len() < 5 {
            return Err(DriverError::BadAck {
                command: "RXCHECK".into(),
                attempts: 1,
            });
        }
        Ok(Diagnostics {
            total_received: values[0],
            total_missed: values[1],
            resync_count: values[2],
            max_received_in_row: values[3],
            crc_errors: values[4],
        })
    }

    /// Read one LOOP packet of real-time data.
    pub fn get_current_data(&mut self) -> Result<LoopReading, DriverError> {
        self.command_ack("LOOP 1")?;
        let raw = self.transport.read(99, None)?;
        let packet = LoopPacket::decode(&raw)?;
        Ok(LoopReading {
            packet,
            read_at: Local::now(),
        })
    }

    /// Read the console's current date and time.
    pub fn get_time(&mut self) -> Result<NaiveDateTime, DriverError> {
        for attempt in 1..=self.command_retries {
            self.wake_up()?;
            self.transport.write(b"GETTIME\n")?;
            if !self.read_ack().unwrap_or(false) {
                if attempt < self.command_retries {
                    sleep(COMMAND_RETRY_DELAY);
                }
                continue;
            }
            let raw = self.transport.read(8, None)?;
            if !vantage_protocol::crc_verify(&raw) {
                if attempt < self.command_retries {
                    sleep(COMMAND_RETRY_DELAY);
                }
                continue;
            }
            let mut payload = [0u8; 6];
            payload.copy_from_slice(&raw[..6]);
            return Ok(vantage_protocol::unpack_datetime(&payload)?);
        }
        Err(DriverError::BadAck {
            command: "GETTIME".into(),
            attempts: self.command_retries,
        })
    }

    /// Set the console's date and time.
    pub fn set_time(&mut self, when: NaiveDateTime) -> Result<(), DriverError> {
        for attempt in 1..=self.command_retries {
            self.wake_up()?;
            self.transport.write(b"SETTIME\n")?;
            if !self.read_ack().unwrap_or(false) {
                if attempt < self.command_retries {
                    sleep(COMMAND_RETRY_DELAY);
                }
                continue;
            }
            let framed = vantage_protocol::crc_append(vantage_protocol::pack_datetime(when).to_vec());
            self.transport.write(&framed)?;
            if self.read_ack().unwrap_or(false) {
                return Ok(());
            }
            if attempt < self.command_retries {
                sleep(COMMAND_RETRY_DELAY);
            }
        }
        Err(DriverError::BadAck {
            command: "SETTIME".into(),
            attempts: self.command_retries,
        })
    }

    /// Consume ack/nack tokens visible to the archive downloader without
    /// exposing raw transport access outside this crate.
    pub(crate) fn write_token(&mut self, token: u8) -> Result<(), DriverError> {
        self.transport.write(&[token])?;
        Ok(())
    }
}
