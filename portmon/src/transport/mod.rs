//! Physical channels a session can monitor.
//!
//! Serial lines, UDP sockets and single-peer TCP servers differ in how they
//! deliver bytes: serial reads time out with nothing to report, UDP reads
//! carry a sender address, TCP needs a peer before anything flows and ends
//! with a zero-length read. [`Transport`] hides those differences behind one
//! open/read/write/close contract and reports every read as an explicit
//! [`ReadOutcome`], so callers never have to guess what an empty read meant.
//!
//! All reads and the TCP accept are cancel safe: dropping the future loses
//! no data, which lets the session race them against a cancellation token.

pub mod serial;
pub mod tcp;
pub mod udp;

use std::net::SocketAddr;

use bytes::Bytes;

use crate::config::TransportConfig;
use crate::error::TransportError;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Which kind of channel a transport is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TransportMode {
    Serial,
    Udp,
    Tcp,
}

impl TransportMode {
    /// Whether the transport must wait for a peer before data can flow.
    pub fn awaits_peer(self) -> bool {
        matches!(self, TransportMode::Tcp)
    }
}

/// One unit of received data, exactly as a single read returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    origin: Option<SocketAddr>,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>, origin: Option<SocketAddr>) -> Self {
        Self {
            data: data.into(),
            origin,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Sender address. Only UDP chunks carry one.
    pub fn origin(&self) -> Option<SocketAddr> {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Result of one successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes arrived
    Data(Chunk),
    /// Nothing arrived within the read timeout; the channel is still alive
    Idle,
    /// The stream peer closed its end
    EndOfStream,
}

/// An open channel of one of the supported kinds.
#[derive(Debug)]
pub enum Transport {
    Serial(SerialTransport),
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

impl Transport {
    /// Open the channel described by `config`.
    ///
    /// For TCP this binds and listens only; the peer is taken by
    /// [`Transport::wait_for_peer`].
    pub async fn open(
        config: &TransportConfig,
        read_buffer_size: usize,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        if read_buffer_size == 0 {
            return Err(TransportError::InvalidParameter(
                "read buffer size must be positive".to_string(),
            ));
        }

        match config {
            TransportConfig::Serial {
                path,
                baud_rate,
                read_timeout,
            } => SerialTransport::open(path, *baud_rate, *read_timeout, read_buffer_size)
                .map(Transport::Serial),
            TransportConfig::Udp { bind, default_peer } => {
                UdpTransport::open(*bind, *default_peer).await.map(Transport::Udp)
            }
            TransportConfig::Tcp { listen } => TcpTransport::open(*listen, read_buffer_size)
                .await
                .map(Transport::Tcp),
        }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            Transport::Serial(_) => TransportMode::Serial,
            Transport::Udp(_) => TransportMode::Udp,
            Transport::Tcp(_) => TransportMode::Tcp,
        }
    }

    /// Current peer: last UDP sender (or default), accepted TCP peer.
    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            Transport::Serial(_) => None,
            Transport::Udp(t) => t.peer(),
            Transport::Tcp(t) => t.peer(),
        }
    }

    /// Locally bound address, for sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Serial(_) => None,
            Transport::Udp(t) => t.local_addr(),
            Transport::Tcp(t) => t.local_addr(),
        }
    }

    /// Block until the channel can carry data.
    ///
    /// Returns immediately for serial and UDP; TCP accepts its single peer.
    pub async fn wait_for_peer(&mut self) -> Result<Option<SocketAddr>, TransportError> {
        match self {
            Transport::Serial(_) => Ok(None),
            Transport::Udp(t) => Ok(t.peer()),
            Transport::Tcp(t) => t.accept().await.map(Some),
        }
    }

    pub async fn read(&mut self) -> Result<ReadOutcome, TransportError> {
        match self {
            Transport::Serial(t) => t.read().await,
            Transport::Udp(t) => t.read().await,
            Transport::Tcp(t) => t.read().await,
        }
    }

    /// Write all of `data`, or fail.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match self {
            Transport::Serial(t) => t.write(data).await,
            Transport::Udp(t) => t.write(data).await,
            Transport::Tcp(t) => t.write(data).await,
        }
    }

    /// Release the OS resources. Calling it again does nothing.
    pub async fn close(&mut self) {
        match self {
            Transport::Serial(t) => t.close(),
            Transport::Udp(t) => t.close(),
            Transport::Tcp(t) => t.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Serial(t) => t.is_closed(),
            Transport::Udp(t) => t.is_closed(),
            Transport::Tcp(t) => t.is_closed(),
        }
    }
}
