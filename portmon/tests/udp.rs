mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::*;
use portmon::{ControllerState, LifecycleEvent, SendError, TransportConfig, TransportMode};
use tokio::net::UdpSocket;
use tokio::time;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn recv(peer: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = [0u8; 1500];
    let (n, from) = time::timeout(PROMPTLY, peer.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .unwrap();
    (buf[..n].to_vec(), from)
}

#[tokio::test]
async fn ping_pong() {
    let (mut controller, mut events) = controller();
    controller
        .start(TransportConfig::udp(loopback()))
        .await
        .unwrap();
    let bound = controller.local_addr().unwrap();
    assert_ne!(bound.port(), 0);

    assert_eq!(
        next_lifecycle(&mut events).await,
        LifecycleEvent::Connected {
            mode: TransportMode::Udp,
            peer: None
        }
    );

    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(b"PING", bound).await.unwrap();

    let chunk = next_chunk(&mut events).await;
    assert_eq!(chunk.data().as_ref(), b"PING");
    assert_eq!(chunk.origin(), Some(peer.local_addr().unwrap()));
    assert_quiet(&mut events).await;

    controller.send(b"PONG").await.unwrap();
    let (data, from) = recv(&peer).await;
    assert_eq!(data, b"PONG");
    assert_eq!(from, bound);

    controller.stop().await;
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn send_before_any_datagram_has_no_peer() {
    let (mut controller, mut events) = controller();
    controller
        .start(TransportConfig::udp(loopback()))
        .await
        .unwrap();
    next_lifecycle(&mut events).await;

    assert!(matches!(
        controller.send(b"hello").await,
        Err(SendError::NoPeer)
    ));
    assert!(matches!(
        next_lifecycle(&mut events).await,
        LifecycleEvent::WriteFailed(_)
    ));
    // Write failures leave the session running
    assert_eq!(controller.state(), ControllerState::Running);

    controller.stop().await;
}

#[tokio::test]
async fn replies_follow_the_latest_sender() {
    let (mut controller, mut events) = controller();
    controller
        .start(TransportConfig::udp(loopback()))
        .await
        .unwrap();
    let bound = controller.local_addr().unwrap();
    next_lifecycle(&mut events).await;

    let a = UdpSocket::bind(loopback()).await.unwrap();
    let b = UdpSocket::bind(loopback()).await.unwrap();

    a.send_to(b"from a", bound).await.unwrap();
    next_chunk(&mut events).await;
    controller.send(b"to a").await.unwrap();
    assert_eq!(recv(&a).await.0, b"to a");

    b.send_to(b"from b", bound).await.unwrap();
    next_chunk(&mut events).await;
    controller.send(b"to b").await.unwrap();
    assert_eq!(recv(&b).await.0, b"to b");

    controller.stop().await;
}

#[tokio::test]
async fn default_peer_receives_early_sends() {
    let peer = UdpSocket::bind(loopback()).await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let (mut controller, mut events) = controller();
    controller
        .start(TransportConfig::udp(loopback()).with_default_peer(peer_addr))
        .await
        .unwrap();
    assert_eq!(
        next_lifecycle(&mut events).await,
        LifecycleEvent::Connected {
            mode: TransportMode::Udp,
            peer: Some(peer_addr)
        }
    );

    controller.send(b"hello").await.unwrap();
    assert_eq!(recv(&peer).await.0, b"hello");
    controller.stop().await;
}

#[tokio::test]
async fn each_datagram_is_one_chunk_in_order() {
    let sent: [&[u8]; 3] = [b"alpha", b"\x00\x01\x02", b"omega"];

    // Each interleaving is a pause (ms) after each datagram
    for pauses in [[0u64, 0, 0], [20, 0, 20], [0, 30, 5]] {
        let (mut controller, mut events) = controller();
        controller
            .start(TransportConfig::udp(loopback()))
            .await
            .unwrap();
        let bound = controller.local_addr().unwrap();
        next_lifecycle(&mut events).await;

        let peer = UdpSocket::bind(loopback()).await.unwrap();
        for (payload, pause) in sent.iter().zip(pauses) {
            peer.send_to(payload, bound).await.unwrap();
            time::sleep(Duration::from_millis(pause)).await;
        }

        for payload in sent {
            assert_eq!(next_chunk(&mut events).await.data().as_ref(), payload);
        }
        assert_quiet(&mut events).await;
        controller.stop().await;
    }
}

#[tokio::test]
async fn large_datagram_is_not_truncated() {
    let (mut controller, mut events) = controller();
    controller
        .start(TransportConfig::udp(loopback()))
        .await
        .unwrap();
    let bound = controller.local_addr().unwrap();
    next_lifecycle(&mut events).await;

    let payload: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
    let peer = UdpSocket::bind(loopback()).await.unwrap();
    peer.send_to(&payload, bound).await.unwrap();

    assert_eq!(
        next_chunk(&mut events).await.data().as_ref(),
        payload.as_slice()
    );
    controller.stop().await;
}

#[tokio::test]
async fn bind_conflict_fails_start_and_allows_retry() {
    let squatter = std::net::UdpSocket::bind(loopback()).unwrap();
    let taken = squatter.local_addr().unwrap();

    let (mut controller, mut events) = controller();
    let err = controller
        .start(TransportConfig::udp(taken))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Address in use"), "{err}");
    assert!(matches!(
        next_lifecycle(&mut events).await,
        LifecycleEvent::StartFailed(_)
    ));
    assert_eq!(controller.state(), ControllerState::Idle);

    controller
        .start(TransportConfig::udp(loopback()))
        .await
        .unwrap();
    assert_eq!(controller.state(), ControllerState::Running);
    controller.stop().await;
}
