//! Integration tests for chunked file and chat transfer.
//!
//! Two [`TransferEngine`]s share a loopback channel pair; each side runs
//! its receiver in a background task, as a real peer would.
//!
//! Verification command: `cargo test --test transfer`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use pairlink::channel::DataChannel;
use pairlink::channel::loopback::LoopbackChannel;
use pairlink::transfer::{
    AbortReason, ReceivedFile, TransferConfig, TransferEngine, TransferError, TransferEvent,
};

const TIMEOUT: Duration = Duration::from_secs(5);

type Engine = Arc<TransferEngine<LoopbackChannel>>;

struct Peer {
    engine: Engine,
    events: mpsc::Receiver<TransferEvent>,
    receiver: tokio::task::JoinHandle<Result<(), TransferError>>,
}

/// Builds two connected peers with running receivers.
fn peers(config: TransferConfig) -> (Peer, Peer) {
    let (a, b) = LoopbackChannel::pair();
    (spawn_peer(a, config), spawn_peer(b, config))
}

fn spawn_peer(channel: LoopbackChannel, config: TransferConfig) -> Peer {
    let engine = Arc::new(TransferEngine::new(channel, config).unwrap());
    let (tx, events) = mpsc::channel(256);
    let receiver = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_receiver(tx).await })
    };
    Peer {
        engine,
        events,
        receiver,
    }
}

async fn next_event(peer: &mut Peer) -> TransferEvent {
    tokio::time::timeout(TIMEOUT, peer.events.recv())
        .await
        .expect("event timed out")
        .expect("receiver stopped")
}

/// Collects events up to and including the next terminal file event.
async fn until_file_done(peer: &mut Peer) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(peer).await;
        let done = matches!(
            event,
            TransferEvent::FileReceived(_) | TransferEvent::Aborted { .. }
        );
        events.push(event);
        if done {
            return events;
        }
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

#[tokio::test]
async fn file_round_trip_with_progress() {
    let (alice, mut bob) = peers(TransferConfig::default());
    let data = sample(40_000);

    let summary = alice.engine.send_bytes("report.pdf", &data).await.unwrap();
    assert_eq!(summary.chunks, 3);

    let events = until_file_done(&mut bob).await;
    assert_eq!(
        events.first(),
        Some(&TransferEvent::FileStarted {
            name: "report.pdf".into(),
            size: 40_000,
        })
    );
    let progress: Vec<(u64, u8)> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress {
                received, percent, ..
            } => Some((*received, *percent)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(16_384, 41), (32_768, 82), (40_000, 100)]);
    assert_eq!(
        events.last(),
        Some(&TransferEvent::FileReceived(ReceivedFile {
            name: "report.pdf".into(),
            size: 40_000,
            data,
        }))
    );
}

#[tokio::test]
async fn large_file_under_tight_backpressure() {
    let config = TransferConfig {
        chunk_size: 1024,
        high_water_mark: 8 * 1024,
    };
    let (alice, mut bob) = peers(config);
    let data = sample(1024 * 1024 + 17);

    let send = {
        let engine = Arc::clone(&alice.engine);
        let data = data.clone();
        tokio::spawn(async move { engine.send_bytes("big.bin", &data).await })
    };

    let events = until_file_done(&mut bob).await;
    let summary = send.await.unwrap().unwrap();
    assert_eq!(summary.chunks, 1025);

    let Some(TransferEvent::FileReceived(file)) = events.last() else {
        panic!("expected FileReceived, got {:?}", events.last());
    };
    assert_eq!(file.data, data);
    assert!(alice.engine.channel().peak_buffered_amount() < 8 * 1024 + 1024 + 256);
}

#[tokio::test]
async fn both_directions_at_once() {
    let (mut alice, mut bob) = peers(TransferConfig {
        chunk_size: 512,
        high_water_mark: 2048,
    });
    let to_bob = sample(10_000);
    let to_alice = sample(7_777);

    let (a_sent, b_sent) = tokio::join!(
        alice.engine.send_bytes("to-bob", &to_bob),
        bob.engine.send_bytes("to-alice", &to_alice),
    );
    a_sent.unwrap();
    b_sent.unwrap();

    let bob_events = until_file_done(&mut bob).await;
    let alice_events = until_file_done(&mut alice).await;
    assert!(matches!(bob_events.last(), Some(TransferEvent::FileReceived(f)) if f.data == to_bob));
    assert!(
        matches!(alice_events.last(), Some(TransferEvent::FileReceived(f)) if f.data == to_alice)
    );
}

#[tokio::test]
async fn chat_during_transfer_arrives_before_file_completes() {
    let (alice, mut bob) = peers(TransferConfig {
        chunk_size: 256,
        high_water_mark: 1024,
    });

    let send = {
        let engine = Arc::clone(&alice.engine);
        tokio::spawn(async move { engine.send_bytes("slow.bin", &sample(256 * 1024)).await })
    };
    assert!(matches!(
        next_event(&mut bob).await,
        TransferEvent::FileStarted { .. }
    ));
    alice.engine.send_chat("almost there").await.unwrap();

    let events = until_file_done(&mut bob).await;
    let chat_at = events
        .iter()
        .position(|e| *e == TransferEvent::Chat("almost there".into()))
        .expect("chat delivered");
    assert!(chat_at < events.len() - 1);
    assert!(matches!(events.last(), Some(TransferEvent::FileReceived(_))));
    send.await.unwrap().unwrap();
}

#[tokio::test]
async fn unrecognized_text_is_shown_as_chat() {
    let (alice, mut bob) = peers(TransferConfig::default());

    alice.engine.channel().send_text("plain words").await.unwrap();
    alice
        .engine
        .channel()
        .send_text(r#"{"kind":"teleport"}"#)
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut bob).await,
        TransferEvent::Chat("plain words".into())
    );
    assert_eq!(
        next_event(&mut bob).await,
        TransferEvent::Chat(r#"{"kind":"teleport"}"#.into())
    );
}

#[tokio::test]
async fn close_mid_transfer_aborts_on_receiver_and_fails_sender() {
    let (alice, mut bob) = peers(TransferConfig {
        chunk_size: 1024,
        high_water_mark: 1024,
    });

    let send = {
        let engine = Arc::clone(&alice.engine);
        tokio::spawn(async move { engine.send_bytes("doomed.bin", &sample(1024 * 1024)).await })
    };
    assert!(matches!(
        next_event(&mut bob).await,
        TransferEvent::FileStarted { .. }
    ));
    assert!(matches!(
        next_event(&mut bob).await,
        TransferEvent::Progress { .. }
    ));

    bob.engine.close();

    let result = tokio::time::timeout(TIMEOUT, send)
        .await
        .expect("sender should notice the close")
        .unwrap();
    assert!(matches!(result, Err(TransferError::Channel(_))));

    let events = until_file_done(&mut bob).await;
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Aborted {
            reason: AbortReason::ChannelClosed,
            ..
        })
    ));

    tokio::time::timeout(TIMEOUT, bob.receiver)
        .await
        .expect("receiver should stop")
        .unwrap()
        .unwrap();
}
