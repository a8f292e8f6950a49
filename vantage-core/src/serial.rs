//! Direct serial port transport, backed by the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::error::TransportError;
use crate::transport::Transport;

/// Direct RS-232/USB-serial connection to the console.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    /// Open `device` at `baud_rate` with 8N1 framing and the given default
    /// read timeout. Use [`SerialTransport::open_with_framing`] for other
    /// bit/parity/stop configurations.
    pub fn open(
        device: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Self::open_with_framing(device, baud_rate, 8, Parity::None, StopBits::One, timeout)
    }

    /// Open `device` with an explicit data-bits/parity/stop-bits framing.
    pub fn open_with_framing(
        device: &str,
        baud_rate: u32,
        data_bits: u8,
        parity: Parity,
        stop_bits: StopBits,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let data_bits = match data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let port = serialport::new(device, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(timeout)
            .open()
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;
        Ok(Self { port, timeout })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, n: usize, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.unwrap_or(self.timeout);
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            match self.port.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(read) => got += read,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                },
                Err(e) => return Err(e.into()),
            }
        }

        if got < n {
            log::warn!("serial transport short read: expected {n}, got {got}");
            return Err(TransportError::Timeout { expected: n, got });
        }
        Ok(buf)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        let _ = self.port.set_timeout(timeout);
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
