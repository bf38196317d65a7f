//! Receive loop for one open transport.
//!
//! A [`Session`] takes ownership of a transport and runs on its own tokio
//! task. It reads until cancelled or until the channel ends, handing every
//! chunk and terminal condition to a [`SessionHandler`]. Writes are requested
//! over a command channel so the transport never has two owners.
//!
//! Cancellation is the close signal. Every blocking await (read, accept,
//! write) is raced against the token, so a session parked on a silent
//! socket still stops promptly.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::tracing::prelude::*;
use crate::transport::{Chunk, ReadOutcome, Transport};

/// Callbacks a session makes from its task.
pub trait SessionHandler: Send + 'static {
    /// The transport is ready to carry data.
    fn on_connected(&mut self, peer: Option<SocketAddr>);

    fn on_chunk(&mut self, chunk: Chunk);

    /// Reading (or accepting) failed. Terminal; the transport is closed
    /// before this is called.
    fn on_error(&mut self, err: TransportError);

    /// The stream peer hung up. Terminal; the transport is closed before
    /// this is called.
    fn on_end_of_stream(&mut self);
}

/// Requests from the controlling context.
#[derive(Debug)]
pub enum SessionCommand {
    Write {
        data: Bytes,
        response_tx: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Stopped from outside
    Cancelled,
    /// The peer closed the stream
    EndOfStream,
    /// Read or accept failed
    Failed,
}

/// One transport, its receive loop, and the way to stop it.
pub struct Session<H> {
    transport: Transport,
    handler: H,
    cancel: CancellationToken,
    commands: mpsc::Receiver<SessionCommand>,
    write_timeout: Duration,
}

impl<H: SessionHandler> Session<H> {
    pub fn new(
        transport: Transport,
        handler: H,
        cancel: CancellationToken,
        commands: mpsc::Receiver<SessionCommand>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            handler,
            cancel,
            commands,
            write_timeout,
        }
    }

    /// Run until cancelled or the channel ends. Always closes the transport.
    pub async fn run(mut self) -> SessionExit {
        let mode = self.transport.mode();
        trace!(%mode, "Session started.");

        let exit = match self.connect().await {
            Ok(()) => self.receive().await,
            Err(exit) => exit,
        };

        trace!(%mode, ?exit, "Session stopped.");
        exit
    }

    async fn connect(&mut self) -> Result<(), SessionExit> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.transport.close().await;
                return Err(SessionExit::Cancelled);
            }
            result = self.transport.wait_for_peer() => result,
        };

        match result {
            Ok(peer) => {
                self.handler.on_connected(peer);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Waiting for peer failed");
                self.transport.close().await;
                self.handler.on_error(e);
                Err(SessionExit::Failed)
            }
        }
    }

    async fn receive(&mut self) -> SessionExit {
        let ending = loop {
            // Best effort between reads; the select below covers blocked reads
            if self.cancel.is_cancelled() {
                break Ending::Cancelled;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ending::Cancelled,
                Some(cmd) = self.commands.recv() => {
                    self.handle_command(cmd).await;
                }
                outcome = self.transport.read() => match outcome {
                    Ok(ReadOutcome::Data(chunk)) => {
                        trace!(bytes = chunk.len(), origin = ?chunk.origin(), "Chunk received");
                        self.handler.on_chunk(chunk);
                    }
                    Ok(ReadOutcome::Idle) => {}
                    Ok(ReadOutcome::EndOfStream) => break Ending::EndOfStream,
                    Err(e) => break Ending::Failed(e),
                },
            }
        };

        self.transport.close().await;

        match ending {
            Ending::Cancelled => SessionExit::Cancelled,
            Ending::EndOfStream => {
                info!(peer = ?self.transport.peer(), "Peer closed the connection");
                self.handler.on_end_of_stream();
                SessionExit::EndOfStream
            }
            Ending::Failed(e) => {
                error!(error = %e, "Read failed");
                self.handler.on_error(e);
                SessionExit::Failed
            }
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Write { data, response_tx } => {
                let result = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(TransportError::Closed),
                    result = time::timeout(self.write_timeout, self.transport.write(&data)) => {
                        result.unwrap_or_else(|_| {
                            Err(TransportError::Io(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "write timed out",
                            )))
                        })
                    }
                };
                if let Err(e) = &result {
                    debug!(error = %e, bytes = data.len(), "Write failed");
                }
                // Send response back (ignore if requester gave up)
                let _ = response_tx.send(result);
            }
        }
    }
}

enum Ending {
    Cancelled,
    EndOfStream,
    Failed(TransportError),
}
