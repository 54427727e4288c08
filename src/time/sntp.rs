//! Minimal SNTP client.
//!
//! One 48-byte client request per query, the server's transmit timestamp is
//! the answer. No RTT correction: second resolution is enough for an RTC
//! that only stores whole seconds.

use log::{debug, info};
use std::fmt;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// SNTP port (UDP 123)
pub const SNTP_PORT: u16 = 123;

/// NTP packet size without extensions.
const NTP_PACKET_LEN: usize = 48;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// Highest stratum of a synchronized server.
const MAX_STRATUM: u8 = 15;

/// A network time source.
pub trait TimeSource {
    /// Query `host` and return Unix seconds (UTC).
    fn query(&mut self, host: &str, timeout: Duration) -> Result<i64, SntpError>;
}

/// SNTP over a blocking UDP socket.
#[derive(Debug)]
pub struct SntpClient {
    port: u16,
}

impl Default for SntpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SntpClient {
    pub fn new() -> Self {
        Self { port: SNTP_PORT }
    }

    /// Query a non-standard port.
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl TimeSource for SntpClient {
    fn query(&mut self, host: &str, timeout: Duration) -> Result<i64, SntpError> {
        let addr = (host, self.port)
            .to_socket_addrs()
            .map_err(|_| SntpError::Resolve(host.to_string()))?
            .find(|a| a.is_ipv4())
            .ok_or_else(|| SntpError::Resolve(host.to_string()))?;
        debug!("Resolved {} to {}", host, addr);

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(timeout))?;
        socket.connect(addr)?;

        socket.send(&request_packet())?;

        let mut response = [0u8; NTP_PACKET_LEN + 16];
        let len = socket.recv(&mut response)?;
        let timestamp = parse_response(&response[..len])?;

        info!("SNTP time from {}: {}", host, timestamp);
        Ok(timestamp)
    }
}

/// Client request: LI=0, VN=3, Mode=3.
fn request_packet() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Extract the transmit timestamp of a server reply as Unix seconds.
pub fn parse_response(packet: &[u8]) -> Result<i64, SntpError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(SntpError::ShortResponse(packet.len()));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 {
        return Err(SntpError::UnexpectedMode(mode));
    }

    match packet[1] {
        0 => return Err(SntpError::KissOfDeath),
        s if s > MAX_STRATUM => return Err(SntpError::Unsynchronized(s)),
        _ => {}
    }

    let secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    if secs == 0 {
        return Err(SntpError::ZeroTimestamp);
    }

    // Era 1 starts 2036-02-07; small values wrapped past it
    let mut ntp_secs = i64::from(secs);
    if secs < 0x8000_0000 {
        ntp_secs += 1 << 32;
    }

    Ok(ntp_secs - NTP_UNIX_OFFSET)
}

/// SNTP query errors.
#[derive(Debug)]
pub enum SntpError {
    /// Socket error, including receive timeout.
    Io(io::Error),
    /// Hostname did not resolve to an IPv4 address.
    Resolve(String),
    /// Reply shorter than an NTP header.
    ShortResponse(usize),
    /// Reply was not a server-mode packet.
    UnexpectedMode(u8),
    /// Stratum 0 reply.
    KissOfDeath,
    /// Stratum above 15.
    Unsynchronized(u8),
    /// Transmit timestamp not set.
    ZeroTimestamp,
}

impl fmt::Display for SntpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "SNTP I/O error: {}", e),
            Self::Resolve(host) => write!(f, "cannot resolve {}", host),
            Self::ShortResponse(len) => write!(f, "short SNTP reply ({} bytes)", len),
            Self::UnexpectedMode(mode) => write!(f, "unexpected SNTP mode {}", mode),
            Self::KissOfDeath => write!(f, "kiss-of-death reply"),
            Self::Unsynchronized(stratum) => write!(f, "server unsynchronized (stratum {})", stratum),
            Self::ZeroTimestamp => write!(f, "reply has no transmit timestamp"),
        }
    }
}

impl std::error::Error for SntpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SntpError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
