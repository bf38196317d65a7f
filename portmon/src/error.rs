//! Common error types for portmon.
//!
//! Transport operations report [`TransportError`]; the controller wraps those
//! into [`StartError`] and [`SendError`], which also carry the state-machine
//! rejections (start while running, send while idle). The crate-wide
//! [`Error`] collects everything for callers that just want one type.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors from opening, reading, writing or closing a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Configuration rejected before any OS resource was touched
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Serial device missing or claimed by another process
    #[error("Device unavailable: {path}: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    /// Socket address already bound elsewhere
    #[error("Address in use: {0}")]
    AddressInUse(SocketAddr),

    /// UDP write with neither a received datagram nor a default peer
    #[error("No peer known to send to")]
    NoPeer,

    /// Operation on a transport after close
    #[error("Transport closed")]
    Closed,

    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors not covered above
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

impl TransportError {
    /// Map a socket bind failure, keeping the address that was asked for.
    pub(crate) fn from_bind(addr: SocketAddr, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AddrInUse => TransportError::AddressInUse(addr),
            std::io::ErrorKind::AddrNotAvailable | std::io::ErrorKind::InvalidInput => {
                TransportError::InvalidParameter(format!("cannot bind {addr}: {err}"))
            }
            _ => TransportError::Io(err),
        }
    }
}

/// Errors returned by `Controller::start`.
#[derive(Error, Debug)]
pub enum StartError {
    /// A session is already starting or running
    #[error("A session is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned by `Controller::send`.
#[derive(Error, Debug)]
pub enum SendError {
    /// No running session
    #[error("Not connected")]
    NotConnected,

    /// UDP session that has not heard from anyone yet
    #[error("No peer known to send to")]
    NoPeer,

    #[error("Write failed: {0}")]
    Write(TransportError),
}

impl From<TransportError> for SendError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoPeer => SendError::NoPeer,
            TransportError::Closed => SendError::NotConnected,
            other => SendError::Write(other),
        }
    }
}

/// Main error type for portmon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
