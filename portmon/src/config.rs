//! Configuration for portmon.
//!
//! [`TransportConfig`] selects and parameterises the one channel a session
//! opens. [`ControllerConfig`] holds the knobs shared by every session and is
//! normally built from the environment.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, TransportError};
use crate::transport::TransportMode;

/// Baud rate used when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Port used for UDP and TCP when none is given.
pub const DEFAULT_PORT: u16 = 12345;

/// Bytes requested per read on stream transports.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Serial reads return empty after this long without data.
pub const DEFAULT_SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Writes that have not completed after this long fail.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

fn default_read_timeout() -> Duration {
    DEFAULT_SERIAL_READ_TIMEOUT
}

/// Channel selection for one session. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`
        path: String,
        baud_rate: u32,
        /// Upper bound on a single read
        #[serde(default = "default_read_timeout")]
        read_timeout: Duration,
    },
    Udp {
        bind: SocketAddr,
        /// Destination for sends before any datagram has arrived
        #[serde(default)]
        default_peer: Option<SocketAddr>,
    },
    Tcp {
        listen: SocketAddr,
    },
}

impl TransportConfig {
    pub fn serial(path: impl Into<String>, baud_rate: u32) -> Self {
        TransportConfig::Serial {
            path: path.into(),
            baud_rate,
            read_timeout: DEFAULT_SERIAL_READ_TIMEOUT,
        }
    }

    pub fn udp(bind: SocketAddr) -> Self {
        TransportConfig::Udp {
            bind,
            default_peer: None,
        }
    }

    pub fn tcp(listen: SocketAddr) -> Self {
        TransportConfig::Tcp { listen }
    }

    /// Replace the serial read timeout. No effect on other modes.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        if let TransportConfig::Serial { read_timeout, .. } = &mut self {
            *read_timeout = timeout;
        }
        self
    }

    /// Set the UDP default peer. No effect on other modes.
    pub fn with_default_peer(mut self, peer: SocketAddr) -> Self {
        if let TransportConfig::Udp { default_peer, .. } = &mut self {
            *default_peer = Some(peer);
        }
        self
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            TransportConfig::Serial { .. } => TransportMode::Serial,
            TransportConfig::Udp { .. } => TransportMode::Udp,
            TransportConfig::Tcp { .. } => TransportMode::Tcp,
        }
    }

    /// Reject parameters that can never open, before touching the OS.
    pub fn validate(&self) -> std::result::Result<(), TransportError> {
        match self {
            TransportConfig::Serial {
                path,
                baud_rate,
                read_timeout,
            } => {
                if path.trim().is_empty() {
                    return Err(TransportError::InvalidParameter(
                        "serial device path is empty".to_string(),
                    ));
                }
                if *baud_rate == 0 {
                    return Err(TransportError::InvalidParameter(
                        "baud rate must be positive".to_string(),
                    ));
                }
                if read_timeout.is_zero() {
                    return Err(TransportError::InvalidParameter(
                        "serial read timeout must be non-zero".to_string(),
                    ));
                }
                Ok(())
            }
            TransportConfig::Udp { .. } | TransportConfig::Tcp { .. } => Ok(()),
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportConfig::Serial {
                path, baud_rate, ..
            } => write!(f, "serial {path} @ {baud_rate} baud"),
            TransportConfig::Udp { bind, .. } => write!(f, "udp {bind}"),
            TransportConfig::Tcp { listen } => write!(f, "tcp {listen}"),
        }
    }
}

/// Build a socket address from an operator-entered IP and port.
pub fn socket_addr(ip: &str, port: u16) -> std::result::Result<SocketAddr, TransportError> {
    let ip: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidParameter(format!("malformed IP address '{ip}'")))?;
    Ok(SocketAddr::new(ip, port))
}

/// Settings shared by every session a controller runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Bytes requested per read on serial and TCP
    pub read_buffer_size: usize,

    /// Serial read timeout used by the binary when none is given
    pub serial_read_timeout: Duration,

    /// Limit on a single send
    pub write_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER,
            serial_read_timeout: DEFAULT_SERIAL_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `PORTMON_READ_BUFFER`,
    /// `PORTMON_SERIAL_TIMEOUT_MS` and `PORTMON_WRITE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ControllerConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize>(&lookup, "PORTMON_READ_BUFFER")? {
            if size == 0 {
                return Err(Error::Config(
                    "PORTMON_READ_BUFFER must be positive".to_string(),
                ));
            }
            config.read_buffer_size = size;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PORTMON_SERIAL_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(Error::Config(
                    "PORTMON_SERIAL_TIMEOUT_MS must be positive".to_string(),
                ));
            }
            config.serial_read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PORTMON_WRITE_TIMEOUT_MS")? {
            config.write_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key}: cannot parse '{raw}'"))),
    }
}
