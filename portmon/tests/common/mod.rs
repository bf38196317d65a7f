//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use portmon::{Chunk, Controller, LifecycleEvent, MonitorEvent};
use tokio::sync::mpsc;
use tokio::time;

/// Generous bound for anything that should happen "promptly".
pub const PROMPTLY: Duration = Duration::from_secs(5);

pub type Events = mpsc::UnboundedReceiver<MonitorEvent>;

pub fn controller() -> (Controller, Events) {
    let (tx, rx) = mpsc::unbounded_channel::<MonitorEvent>();
    (Controller::new(tx), rx)
}

pub async fn next_event(events: &mut Events) -> MonitorEvent {
    time::timeout(PROMPTLY, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub async fn next_lifecycle(events: &mut Events) -> LifecycleEvent {
    match next_event(events).await {
        MonitorEvent::Lifecycle(event) => event,
        other => panic!("expected a lifecycle event, got {other:?}"),
    }
}

pub async fn next_chunk(events: &mut Events) -> Chunk {
    match next_event(events).await {
        MonitorEvent::Chunk(chunk) => chunk,
        other => panic!("expected a chunk, got {other:?}"),
    }
}

/// Collect chunks until `len` bytes have arrived; returns their
/// concatenation.
pub async fn collect_bytes(events: &mut Events, len: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < len {
        received.extend_from_slice(next_chunk(events).await.data());
    }
    received
}

/// Nothing further arrives within a short grace period.
pub async fn assert_quiet(events: &mut Events) {
    time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event {event:?}");
    }
}
