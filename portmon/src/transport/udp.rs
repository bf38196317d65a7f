//! UDP transport.
//!
//! Every datagram is one chunk; nothing is reassembled. Replies go to
//! whoever sent the most recent datagram, or to the configured default
//! peer before anyone has.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::{Chunk, ReadOutcome};
use crate::error::TransportError;
use crate::tracing::prelude::*;

/// Largest payload an IPv4 UDP datagram can carry.
const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    local_addr: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    buf: Vec<u8>,
}

impl UdpTransport {
    pub async fn open(
        bind: SocketAddr,
        default_peer: Option<SocketAddr>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::from_bind(bind, e))?;
        let local_addr = socket.local_addr().ok();

        debug!(bind = %bind, local = ?local_addr, "UDP socket bound");
        Ok(Self {
            socket: Some(socket),
            local_addr,
            peer: default_peer,
            buf: vec![0; MAX_DATAGRAM],
        })
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Wait for one datagram. Its sender becomes the reply peer.
    ///
    /// An empty datagram updates the peer but carries nothing to deliver, so
    /// it reads as [`ReadOutcome::Idle`].
    pub async fn read(&mut self) -> Result<ReadOutcome, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let (n, from) = socket.recv_from(&mut self.buf).await?;

        if self.peer != Some(from) {
            debug!(peer = %from, "UDP peer changed");
        }
        self.peer = Some(from);

        if n == 0 {
            return Ok(ReadOutcome::Idle);
        }
        Ok(ReadOutcome::Data(Chunk::new(self.buf[..n].to_vec(), Some(from))))
    }

    /// Send `data` as one datagram to the current peer.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let peer = self.peer.ok_or(TransportError::NoPeer)?;

        let sent = socket.send_to(data, peer).await?;
        if sent != data.len() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("datagram truncated: sent {sent} of {} bytes", data.len()),
            )));
        }
        trace!(peer = %peer, bytes = sent, "UDP datagram sent");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(local = ?self.local_addr, "UDP socket closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}
