//! Session lifecycle state machine.
//!
//! The [`Controller`] is what a consumer drives: `start` opens a transport
//! and launches its session, `send` writes through it, `stop` shuts it down.
//! It guarantees at most one session at a time.
//!
//! ```text
//!            start                 connected
//!   Idle ------------> Starting ---------------> Running
//!    ^  <--- open failed --'  \                   /  |
//!    |                         \--- stop ---\    /   | peer gone /
//!    |                                       v  v    | read failed
//!    +------------------------------------ Stopping  |
//!    ^                                               |
//!    +-----------------------------------------------+
//! ```
//!
//! State is only ever changed here, on the caller's context. The session
//! task reports back through a notice channel, and the controller applies
//! what it finds there whenever it is next called.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ControllerConfig, TransportConfig};
use crate::error::{SendError, StartError, TransportError};
use crate::event::{LifecycleEvent, Observer};
use crate::session::{Session, SessionCommand, SessionExit, SessionHandler};
use crate::tracing::prelude::*;
use crate::transport::{Chunk, Transport, TransportMode};

/// Writes queued for the session task before `send` waits.
const COMMAND_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ControllerState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// What the session task tells the controller.
#[derive(Debug)]
enum Notice {
    Connected,
    Ended,
}

struct ActiveSession {
    mode: TransportMode,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    command_tx: mpsc::Sender<SessionCommand>,
    notice_rx: mpsc::UnboundedReceiver<Notice>,
    task: JoinHandle<SessionExit>,
}

/// Starts, stops and talks to at most one monitoring session.
pub struct Controller {
    config: ControllerConfig,
    observer: Arc<dyn Observer>,
    state: ControllerState,
    session: Option<ActiveSession>,
}

impl Controller {
    pub fn new(observer: impl Observer + 'static) -> Self {
        Self::with_config(observer, ControllerConfig::default())
    }

    pub fn with_config(observer: impl Observer + 'static, config: ControllerConfig) -> Self {
        Self {
            config,
            observer: Arc::new(observer),
            state: ControllerState::Idle,
            session: None,
        }
    }

    /// Current state, after applying anything the session has reported.
    pub fn state(&mut self) -> ControllerState {
        self.apply_notices();
        self.state
    }

    /// Mode of the active session.
    pub fn mode(&self) -> Option<TransportMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Address the active socket is bound to, with ephemeral ports resolved.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.as_ref().and_then(|s| s.local_addr)
    }

    /// Open the channel described by `config` and start receiving.
    ///
    /// Only valid while idle. Serial and UDP sessions are running when this
    /// returns; TCP sessions stay `Starting` until a peer connects.
    pub async fn start(&mut self, config: TransportConfig) -> Result<(), StartError> {
        self.apply_notices();
        if self.state != ControllerState::Idle {
            return Err(StartError::AlreadyRunning);
        }

        self.state = ControllerState::Starting;
        // Idle again unless the session is launched, also when this future
        // is dropped mid-open
        let mut settle = SettleState {
            state: &mut self.state,
            on_drop: ControllerState::Idle,
        };
        let mode = config.mode();

        let transport = match Transport::open(&config, self.config.read_buffer_size).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(%config, error = %e, "Failed to start session");
                self.observer.on_event(LifecycleEvent::StartFailed(e.to_string()));
                return Err(e.into());
            }
        };
        let local_addr = transport.local_addr();

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let handler = Forwarder {
            mode,
            observer: self.observer.clone(),
            notice_tx,
        };
        let session = Session::new(
            transport,
            handler,
            cancel.clone(),
            command_rx,
            self.config.write_timeout,
        );
        let task = tokio::spawn(session.run());

        self.session = Some(ActiveSession {
            mode,
            local_addr,
            cancel,
            command_tx,
            notice_rx,
            task,
        });
        settle.on_drop = if mode.awaits_peer() {
            ControllerState::Starting
        } else {
            ControllerState::Running
        };
        drop(settle);

        info!(%config, local = ?local_addr, "Session started");
        Ok(())
    }

    /// Close the transport and wait for the session task to finish.
    ///
    /// Does nothing while idle.
    pub async fn stop(&mut self) {
        self.apply_notices();
        let Some(session) = self.session.as_mut() else {
            self.state = ControllerState::Idle;
            return;
        };

        // Cleared only once joined; an interrupted stop can be repeated
        self.state = ControllerState::Stopping;
        session.cancel.cancel();
        let mode = session.mode;
        match (&mut session.task).await {
            Ok(exit) => debug!(%mode, ?exit, "Session joined"),
            Err(e) => error!(%mode, error = %e, "Session task failed"),
        }
        self.session = None;
        self.state = ControllerState::Idle;
        info!(%mode, "Session stopped");
    }

    /// Write `data` through the running session.
    ///
    /// A failed write is reported as a `WriteFailed` event and returned; the
    /// session keeps running.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        self.apply_notices();
        if self.state != ControllerState::Running {
            return Err(SendError::NotConnected);
        }
        let Some(session) = self.session.as_ref() else {
            return Err(SendError::NotConnected);
        };

        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SessionCommand::Write {
            data: Bytes::copy_from_slice(data),
            response_tx,
        };
        if session.command_tx.send(cmd).await.is_err() {
            // Task already gone; its notice will say why
            self.apply_notices();
            return Err(SendError::NotConnected);
        }

        let result = match response_rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed),
        };
        match result {
            Ok(()) => {
                trace!(bytes = data.len(), "Sent");
                Ok(())
            }
            Err(TransportError::Closed) => {
                self.apply_notices();
                Err(SendError::NotConnected)
            }
            Err(e) => {
                let err = SendError::from(e);
                warn!(error = %err, "Send failed");
                self.observer.on_event(LifecycleEvent::WriteFailed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Wait until the current session ends on its own (or return at once
    /// when idle).
    pub async fn wait_until_idle(&mut self) {
        loop {
            let notice = match self.session.as_mut() {
                Some(session) => session.notice_rx.recv().await,
                None => return,
            };
            self.apply(notice);
        }
    }

    fn apply_notices(&mut self) {
        loop {
            let notice = match self.session.as_mut() {
                Some(session) => match session.notice_rx.try_recv() {
                    Ok(notice) => Some(notice),
                    Err(mpsc::error::TryRecvError::Empty) => return,
                    Err(mpsc::error::TryRecvError::Disconnected) => None,
                },
                None => return,
            };
            self.apply(notice);
        }
    }

    // `None` means the task dropped its sender without a final notice.
    fn apply(&mut self, notice: Option<Notice>) {
        match notice {
            Some(Notice::Connected) => {
                if self.state == ControllerState::Starting {
                    self.state = ControllerState::Running;
                }
            }
            Some(Notice::Ended) | None => {
                // Transport is already closed; the task is returning
                if let Some(session) = self.session.take() {
                    debug!(mode = %session.mode, "Session ended");
                }
                self.state = ControllerState::Idle;
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

/// Sets the controller state to `on_drop` when dropped.
struct SettleState<'a> {
    state: &'a mut ControllerState,
    on_drop: ControllerState,
}

impl Drop for SettleState<'_> {
    fn drop(&mut self) {
        *self.state = self.on_drop;
    }
}

/// Session callbacks: data and events to the observer, state changes back
/// to the controller. Notices go first so a consumer reacting to an event
/// already sees the new state.
struct Forwarder {
    mode: TransportMode,
    observer: Arc<dyn Observer>,
    notice_tx: mpsc::UnboundedSender<Notice>,
}

impl SessionHandler for Forwarder {
    fn on_connected(&mut self, peer: Option<SocketAddr>) {
        let _ = self.notice_tx.send(Notice::Connected);
        self.observer.on_event(LifecycleEvent::Connected {
            mode: self.mode,
            peer,
        });
    }

    fn on_chunk(&mut self, chunk: Chunk) {
        self.observer.on_chunk(&chunk);
    }

    fn on_error(&mut self, err: TransportError) {
        let _ = self.notice_tx.send(Notice::Ended);
        self.observer.on_event(LifecycleEvent::ReadFailed(err.to_string()));
    }

    fn on_end_of_stream(&mut self) {
        let _ = self.notice_tx.send(Notice::Ended);
        self.observer.on_event(LifecycleEvent::Disconnected);
    }
}
