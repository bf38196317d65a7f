//! What the monitor reports to its consumer.
//!
//! A consumer implements [`Observer`] and gets one call per received chunk
//! and one per lifecycle change. Calls come from the session task, so
//! observers must be `Send + Sync` and should return quickly. Consumers that
//! prefer a channel can pass an `mpsc::UnboundedSender<MonitorEvent>`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::transport::{Chunk, TransportMode};

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The channel is ready to carry data. For TCP `peer` is the accepted
    /// connection; for UDP it is the default peer if one was configured.
    Connected {
        mode: TransportMode,
        peer: Option<SocketAddr>,
    },
    /// The peer closed the stream; the session has ended
    Disconnected,
    /// The channel could not be opened
    StartFailed(String),
    /// Reading failed; the session has ended
    ReadFailed(String),
    /// A send failed; the session is still running
    WriteFailed(String),
}

impl LifecycleEvent {
    /// Whether the event means the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::Disconnected | LifecycleEvent::ReadFailed(_)
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Connected {
                mode: TransportMode::Serial,
                ..
            } => write!(f, "Serial connection established."),
            LifecycleEvent::Connected {
                mode: TransportMode::Udp,
                ..
            } => write!(f, "UDP listener started."),
            LifecycleEvent::Connected {
                mode: TransportMode::Tcp,
                peer: Some(peer),
            } => write!(f, "Connected to {peer}"),
            LifecycleEvent::Connected {
                mode: TransportMode::Tcp,
                peer: None,
            } => write!(f, "Connected."),
            LifecycleEvent::Disconnected => write!(f, "Connection closed by peer."),
            LifecycleEvent::StartFailed(reason) => write!(f, "Error: {reason}"),
            LifecycleEvent::ReadFailed(reason) => write!(f, "Error: {reason}"),
            LifecycleEvent::WriteFailed(reason) => write!(f, "Error sending command: {reason}"),
        }
    }
}

/// Receiver of everything a controller reports.
pub trait Observer: Send + Sync {
    /// Called once per received chunk, in arrival order.
    fn on_chunk(&self, chunk: &Chunk);

    fn on_event(&self, event: LifecycleEvent);
}

impl<T: Observer + ?Sized> Observer for Arc<T> {
    fn on_chunk(&self, chunk: &Chunk) {
        (**self).on_chunk(chunk);
    }

    fn on_event(&self, event: LifecycleEvent) {
        (**self).on_event(event);
    }
}

/// Chunks and lifecycle events merged into one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Chunk(Chunk),
    Lifecycle(LifecycleEvent),
}

impl Observer for mpsc::UnboundedSender<MonitorEvent> {
    fn on_chunk(&self, chunk: &Chunk) {
        // Receiver gone means nobody is listening; nothing to do
        let _ = self.send(MonitorEvent::Chunk(chunk.clone()));
    }

    fn on_event(&self, event: LifecycleEvent) {
        let _ = self.send(MonitorEvent::Lifecycle(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(LifecycleEvent::Connected { mode: TransportMode::Serial, peer: None }, "Serial connection established." ; "serial")]
    #[test_case(LifecycleEvent::Connected { mode: TransportMode::Udp, peer: None }, "UDP listener started." ; "udp")]
    #[test_case(LifecycleEvent::Connected { mode: TransportMode::Tcp, peer: Some("10.1.2.3:4000".parse().unwrap()) }, "Connected to 10.1.2.3:4000" ; "tcp")]
    #[test_case(LifecycleEvent::WriteFailed("broken pipe".into()), "Error sending command: broken pipe" ; "write failed")]
    #[test_case(LifecycleEvent::ReadFailed("reset".into()), "Error: reset" ; "read failed")]
    fn display(event: LifecycleEvent, expected: &str) {
        assert_eq!(event.to_string(), expected);
    }

    #[test]
    fn terminal_events() {
        assert!(LifecycleEvent::Disconnected.is_terminal());
        assert!(LifecycleEvent::ReadFailed(String::new()).is_terminal());
        assert!(!LifecycleEvent::WriteFailed(String::new()).is_terminal());
        assert!(!LifecycleEvent::StartFailed(String::new()).is_terminal());
    }

    #[test]
    fn channel_observer_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<MonitorEvent>();
        let chunk = Chunk::new(&b"data"[..], None);

        tx.on_event(LifecycleEvent::Connected {
            mode: TransportMode::Serial,
            peer: None,
        });
        tx.on_chunk(&chunk);
        tx.on_event(LifecycleEvent::Disconnected);

        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::Lifecycle(LifecycleEvent::Connected { .. }))
        ));
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Chunk(chunk));
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::Lifecycle(LifecycleEvent::Disconnected)
        );
    }

    #[test]
    fn channel_observer_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<MonitorEvent>();
        drop(rx);
        tx.on_event(LifecycleEvent::Disconnected);
    }
}
