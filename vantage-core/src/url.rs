//! `tcp:`/`serial:` URL grammar for constructing a default transport.

use std::time::Duration;

use crate::error::TransportError;
use crate::tcp::TcpTransport;
use crate::transport::Transport;

/// Default read timeout applied when a URL doesn't carry one of its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default baud rate for `serial:` URLs that omit one.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Parse a `tcp:<host>:<port>` or `serial:<device>:<baud>:<bits><parity><stop>`
/// URL into a boxed [`Transport`].
///
/// Examples: `tcp:localhost:1111`, `serial:/dev/ttyUSB0:19200:8N1`.
pub fn parse_transport_url(url: &str) -> Result<Box<dyn Transport>, TransportError> {
    let (scheme, rest) = url
        .split_once(':')
        .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

    match scheme {
        "tcp" => {
            let (host, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
            let port: u16 = port
                .parse()
                .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
            let transport = TcpTransport::connect(format!("{host}:{port}"), DEFAULT_TIMEOUT)?;
            Ok(Box::new(transport))
        },
        "serial" => open_serial(url, rest),
        _ => Err(TransportError::InvalidUrl(url.to_string())),
    }
}

#[cfg(feature = "serial")]
fn open_serial(url: &str, rest: &str) -> Result<Box<dyn Transport>, TransportError> {
    use serialport::{Parity, StopBits};

    use crate::serial::SerialTransport;

    let mut parts = rest.splitn(3, ':');
    let device = parts
        .next()
        .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
    let baud_rate = match parts.next() {
        Some(s) => s
            .parse()
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?,
        None => DEFAULT_BAUD_RATE,
    };
    let framing = parts.next().unwrap_or("8N1");
    let (data_bits, parity, stop_bits) = parse_framing(framing)
        .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;

    let transport = SerialTransport::open_with_framing(
        device,
        baud_rate,
        data_bits,
        parity,
        stop_bits,
        DEFAULT_TIMEOUT,
    )?;
    Ok(Box::new(transport))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_url: &str, _rest: &str) -> Result<Box<dyn Transport>, TransportError> {
    Err(TransportError::SerialUnsupported)
}

#[cfg(feature = "serial")]
fn parse_framing(framing: &str) -> Option<(u8, serialport::Parity, serialport::StopBits)> {
    use serialport::{Parity, StopBits};

    let mut chars = framing.chars();
    let data_bits: u8 = chars.next()?.to_digit(10)? as u8;
    let parity = match chars.next()? {
        'N' | 'n' => Parity::None,
        'E' | 'e' => Parity::Even,
        'O' | 'o' => Parity::Odd,
        _ => return None,
    };
    let stop_bits = match chars.next()? {
        '1' => StopBits::One,
        '2' => StopBits::Two,
        _ => return None,
    };
    Some((data_bits, parity, stop_bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_scheme() {
        assert!(matches!(
            parse_transport_url("localhost:1111"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            parse_transport_url("usb:/dev/ttyUSB0"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[cfg(feature = "serial")]
    #[test]
    fn parses_default_framing() {
        let (bits, parity, stop) = parse_framing("8N1").unwrap();
        assert_eq!(bits, 8);
        assert!(matches!(parity, serialport::Parity::None));
        assert!(matches!(stop, serialport::StopBits::One));
    }

    #[cfg(feature = "serial")]
    #[test]
    fn parses_even_parity_two_stop() {
        let (bits, parity, stop) = parse_framing("7E2").unwrap();
        assert_eq!(bits, 7);
        assert!(matches!(parity, serialport::Parity::Even));
        assert!(matches!(stop, serialport::StopBits::Two));
    }
}
