//! Serial line transport.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{Chunk, ReadOutcome};
use crate::error::TransportError;
use crate::tracing::prelude::*;

/// A serial device opened exclusively at a fixed baud rate.
pub struct SerialTransport {
    path: String,
    port: Option<SerialStream>,
    read_timeout: Duration,
    buf: Vec<u8>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`.
    ///
    /// The port is opened exclusively, so a device held by another process
    /// reports [`TransportError::DeviceUnavailable`] just like a missing one.
    pub fn open(
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
        read_buffer_size: usize,
    ) -> Result<Self, TransportError> {
        if baud_rate == 0 {
            return Err(TransportError::InvalidParameter(
                "baud rate must be positive".to_string(),
            ));
        }

        let port = tokio_serial::new(path, baud_rate)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(|e| map_open_error(path, e))?;

        debug!(path, baud_rate, "Serial port opened");
        Ok(Self {
            path: path.to_string(),
            port: Some(port),
            read_timeout,
            buf: vec![0; read_buffer_size],
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait up to the read timeout for bytes.
    ///
    /// A timeout is [`ReadOutcome::Idle`]. So is a zero-length read: a serial
    /// line has no notion of the other end hanging up.
    pub async fn read(&mut self) -> Result<ReadOutcome, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        match time::timeout(self.read_timeout, port.read(&mut self.buf)).await {
            Err(_elapsed) => Ok(ReadOutcome::Idle),
            Ok(Ok(0)) => Ok(ReadOutcome::Idle),
            Ok(Ok(n)) => Ok(ReadOutcome::Data(Chunk::new(self.buf[..n].to_vec(), None))),
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Ok(ReadOutcome::Idle),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.write_all(data).await?;
        port.flush().await?;
        trace!(path = %self.path, bytes = data.len(), "Serial write complete");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(path = %self.path, "Serial port closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.port.is_none()
    }
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("open", &self.port.is_some())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

fn map_open_error(path: &str, err: tokio_serial::Error) -> TransportError {
    use tokio_serial::ErrorKind;

    match err.kind {
        ErrorKind::NoDevice
        | ErrorKind::Io(
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock,
        ) => TransportError::DeviceUnavailable {
            path: path.to_string(),
            reason: err.description,
        },
        ErrorKind::InvalidInput => TransportError::InvalidParameter(err.description),
        _ => TransportError::Serial(err),
    }
}

/// Names of the serial devices present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
