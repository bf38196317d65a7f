//! Single-peer TCP server transport.
//!
//! The transport listens, accepts exactly one connection, and then stops
//! listening. When that peer leaves the session is over; there is no second
//! accept.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{Chunk, ReadOutcome};
use crate::error::TransportError;
use crate::tracing::prelude::*;

#[derive(Debug)]
pub struct TcpTransport {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    local_addr: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    buf: Vec<u8>,
}

impl TcpTransport {
    /// Bind and listen on `listen`. Does not wait for a peer.
    pub async fn open(listen: SocketAddr, read_buffer_size: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| TransportError::from_bind(listen, e))?;
        let local_addr = listener.local_addr().ok();

        debug!(listen = %listen, local = ?local_addr, "TCP listener bound");
        Ok(Self {
            listener: Some(listener),
            stream: None,
            local_addr,
            peer: None,
            buf: vec![0; read_buffer_size],
        })
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Wait for the one peer this transport will serve.
    ///
    /// The listener is released once a peer is accepted.
    pub async fn accept(&mut self) -> Result<SocketAddr, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if let Some(peer) = self.peer {
            return Ok(peer);
        }
        let listener = self.listener.as_ref().ok_or(TransportError::Closed)?;
        let (stream, peer) = listener.accept().await?;

        self.listener = None;
        self.stream = Some(stream);
        self.peer = Some(peer);
        info!(peer = %peer, "TCP peer connected");
        Ok(peer)
    }

    /// Read application bytes. Zero bytes means the peer shut down.
    pub async fn read(&mut self) -> Result<ReadOutcome, TransportError> {
        let stream = connected(&mut self.stream, &self.listener)?;
        let n = stream.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        Ok(ReadOutcome::Data(Chunk::new(self.buf[..n].to_vec(), None)))
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = connected(&mut self.stream, &self.listener)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        trace!(peer = ?self.peer, bytes = data.len(), "TCP write complete");
        Ok(())
    }

    /// Drop the listener and shut the connection down, whichever is held.
    pub async fn close(&mut self) {
        let had_listener = self.listener.take().is_some();
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                trace!(error = %e, "TCP shutdown failed");
            }
            debug!(peer = ?self.peer, "TCP connection closed");
        } else if had_listener {
            debug!(local = ?self.local_addr, "TCP listener closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none() && self.stream.is_none()
    }
}

fn connected<'a>(
    stream: &'a mut Option<TcpStream>,
    listener: &Option<TcpListener>,
) -> Result<&'a mut TcpStream, TransportError> {
    match (stream, listener) {
        (Some(stream), _) => Ok(stream),
        (None, Some(_)) => Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "no peer accepted yet",
        ))),
        (None, None) => Err(TransportError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn listening() -> (TcpTransport, SocketAddr) {
        let transport = TcpTransport::open("127.0.0.1:0".parse().unwrap(), 64)
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();
        (transport, addr)
    }

    #[tokio::test]
    async fn accept_then_exchange() {
        let (mut transport, addr) = listening().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let peer = transport.accept().await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
        assert_eq!(transport.peer(), Some(peer));

        client.write_all(b"hello").await.unwrap();
        let outcome = transport.read().await.unwrap();
        assert_eq!(outcome, ReadOutcome::Data(Chunk::new(&b"hello"[..], None)));

        transport.write(b"world").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");
    }

    #[tokio::test]
    async fn peer_shutdown_is_end_of_stream() {
        let (mut transport, addr) = listening().await;
        let client = TcpStream::connect(addr).await.unwrap();
        transport.accept().await.unwrap();

        drop(client);
        assert_eq!(transport.read().await.unwrap(), ReadOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn listener_released_after_accept() {
        let (mut transport, addr) = listening().await;
        let _client = TcpStream::connect(addr).await.unwrap();
        transport.accept().await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn read_before_accept_is_not_connected() {
        let (mut transport, _addr) = listening().await;
        match transport.read().await {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotConnected),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut transport, _addr) = listening().await;
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(transport.accept().await, Err(TransportError::Closed)));
        assert!(matches!(transport.write(b"x").await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn bind_conflict_is_address_in_use() {
        let (_transport, addr) = listening().await;
        let err = TcpTransport::open(addr, 64).await.unwrap_err();
        assert!(matches!(err, TransportError::AddressInUse(a) if a == addr));
    }
}
