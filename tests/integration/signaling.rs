//! Integration tests for room pairing and signal relaying.
//!
//! Runs a real relay on a random port and drives it with
//! [`SignalingClient`]s, checking the event sequences each participant
//! sees.
//!
//! Verification command: `cargo test --test signaling`

use std::time::Duration;

use serde_json::json;

use pairlink::signaling::SignalingClient;
use pairlink_proto::signal::{ServerEvent, SignalKind};
use pairlink_relay::registry::CREATOR_LEFT_REASON;
use pairlink_relay::relay::start_server;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

/// Starts a relay server on a random port for testing.
async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = start_server("127.0.0.1:0")
        .await
        .expect("failed to start test relay");
    (format!("ws://{addr}/ws"), handle)
}

async fn connect(url: &str) -> SignalingClient {
    SignalingClient::connect(url, TIMEOUT)
        .await
        .expect("failed to connect to relay")
}

/// Receives the next relay event, failing the test after a timeout.
async fn recv(client: &SignalingClient) -> ServerEvent {
    tokio::time::timeout(TIMEOUT, client.recv())
        .await
        .expect("recv timed out")
        .expect("relay connection closed")
}

/// Asserts that nothing arrives within a short window.
async fn assert_silent(client: &SignalingClient) {
    let result = tokio::time::timeout(Duration::from_millis(100), client.recv()).await;
    assert!(result.is_err(), "expected no event, got {result:?}");
}

async fn room_status(client: &SignalingClient, room: &str) -> (bool, usize) {
    client.check_room(room).await.unwrap();
    match recv(client).await {
        ServerEvent::RoomStatus {
            room: r,
            exists,
            member_count,
        } => {
            assert_eq!(r, room);
            (exists, member_count)
        }
        other => panic!("expected room-status, got {other:?}"),
    }
}

/// Pairs two fresh clients in `room`, draining the pairing events.
async fn paired(url: &str, room: &str) -> (SignalingClient, SignalingClient) {
    let creator = connect(url).await;
    let joiner = connect(url).await;

    creator.create_or_join(room).await.unwrap();
    assert!(matches!(recv(&creator).await, ServerEvent::Created { .. }));
    joiner.create_or_join(room).await.unwrap();
    assert!(matches!(recv(&joiner).await, ServerEvent::Joined { .. }));
    assert!(matches!(recv(&joiner).await, ServerEvent::Ready { .. }));
    assert!(matches!(recv(&creator).await, ServerEvent::Ready { .. }));

    (creator, joiner)
}

// =============================================================================
// Pairing
// =============================================================================

#[tokio::test]
async fn alpha_scenario_pairs_two_and_turns_away_third() {
    let (url, _relay) = start_relay().await;
    let a = connect(&url).await;
    let b = connect(&url).await;
    let c = connect(&url).await;

    a.create_or_join("alpha").await.unwrap();
    assert_eq!(
        recv(&a).await,
        ServerEvent::Created {
            room: "alpha".into(),
            participant_id: a.participant_id().clone(),
        }
    );

    b.create_or_join("alpha").await.unwrap();
    assert_eq!(
        recv(&b).await,
        ServerEvent::Joined {
            room: "alpha".into(),
            participant_id: b.participant_id().clone(),
        }
    );
    assert_eq!(recv(&b).await, ServerEvent::Ready { room: "alpha".into() });
    assert_eq!(recv(&a).await, ServerEvent::Ready { room: "alpha".into() });

    c.create_or_join("alpha").await.unwrap();
    assert_eq!(recv(&c).await, ServerEvent::Full { room: "alpha".into() });
    assert_silent(&a).await;
    assert_silent(&b).await;

    assert_eq!(room_status(&c, "alpha").await, (true, 2));
}

#[tokio::test]
async fn explicit_create_and_join() {
    let (url, _relay) = start_relay().await;
    let a = connect(&url).await;
    let b = connect(&url).await;

    b.join("beta").await.unwrap();
    assert_eq!(recv(&b).await, ServerEvent::Absence { room: "beta".into() });

    a.create("beta").await.unwrap();
    assert!(matches!(recv(&a).await, ServerEvent::Created { .. }));

    b.create("beta").await.unwrap();
    assert_eq!(recv(&b).await, ServerEvent::Exists { room: "beta".into() });

    b.join("beta").await.unwrap();
    assert!(matches!(recv(&b).await, ServerEvent::Joined { .. }));
    assert!(matches!(recv(&b).await, ServerEvent::Ready { .. }));
    assert!(matches!(recv(&a).await, ServerEvent::Ready { .. }));
}

#[tokio::test]
async fn check_room_is_read_only() {
    let (url, _relay) = start_relay().await;
    let a = connect(&url).await;
    let observer = connect(&url).await;

    assert_eq!(room_status(&observer, "gamma").await, (false, 0));
    assert_eq!(room_status(&observer, "gamma").await, (false, 0));

    a.create_or_join("gamma").await.unwrap();
    recv(&a).await;
    assert_eq!(room_status(&observer, "gamma").await, (true, 1));
    assert_silent(&a).await;
}

// =============================================================================
// Relaying
// =============================================================================

#[tokio::test]
async fn offer_and_answer_reach_the_other_member_once() {
    let (url, _relay) = start_relay().await;
    let (a, b) = paired(&url, "delta").await;

    let offer = json!({"type": "offer", "sdp": "v=0 a"});
    a.send_signal("delta", SignalKind::Offer, offer.clone())
        .await
        .unwrap();
    assert_eq!(
        recv(&b).await,
        ServerEvent::Message {
            kind: SignalKind::Offer,
            payload: offer,
        }
    );

    let answer = json!({"type": "answer", "sdp": "v=0 b"});
    b.send_signal("delta", SignalKind::Answer, answer.clone())
        .await
        .unwrap();
    assert_eq!(
        recv(&a).await,
        ServerEvent::Message {
            kind: SignalKind::Answer,
            payload: answer,
        }
    );

    for i in 0..3 {
        a.send_signal("delta", SignalKind::Candidate, json!({"candidate": i}))
            .await
            .unwrap();
    }
    for i in 0..3 {
        assert_eq!(
            recv(&b).await,
            ServerEvent::Message {
                kind: SignalKind::Candidate,
                payload: json!({"candidate": i}),
            }
        );
    }

    assert_silent(&a).await;
    assert_silent(&b).await;
}

#[tokio::test]
async fn signal_in_half_open_room_goes_nowhere() {
    let (url, _relay) = start_relay().await;
    let a = connect(&url).await;

    a.create_or_join("epsilon").await.unwrap();
    recv(&a).await;

    a.send_signal("epsilon", SignalKind::Offer, json!("early"))
        .await
        .unwrap();
    a.send_signal("nowhere", SignalKind::Offer, json!("lost"))
        .await
        .unwrap();

    // The next thing back is the status reply, not an echo.
    assert_eq!(room_status(&a, "epsilon").await, (true, 1));
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn creator_disconnect_closes_room() {
    let (url, _relay) = start_relay().await;
    let (a, b) = paired(&url, "zeta").await;

    a.close().await.unwrap();
    assert_eq!(
        recv(&b).await,
        ServerEvent::RoomClosed {
            room: "zeta".into(),
            reason: CREATOR_LEFT_REASON.into(),
        }
    );
    assert_eq!(room_status(&b, "zeta").await, (false, 0));

    // The released joiner can start over.
    b.create_or_join("zeta").await.unwrap();
    assert!(matches!(recv(&b).await, ServerEvent::Created { .. }));
}

#[tokio::test]
async fn joiner_leave_keeps_room_open() {
    let (url, _relay) = start_relay().await;
    let (a, b) = paired(&url, "eta").await;
    let joiner_id = b.participant_id().clone();

    b.leave().await.unwrap();
    assert_eq!(
        recv(&a).await,
        ServerEvent::PeerLeft {
            room: "eta".into(),
            participant_id: joiner_id,
        }
    );
    assert_eq!(room_status(&a, "eta").await, (true, 1));

    // A newcomer can take the free seat.
    let c = connect(&url).await;
    c.create_or_join("eta").await.unwrap();
    assert!(matches!(recv(&c).await, ServerEvent::Joined { .. }));
    assert!(matches!(recv(&c).await, ServerEvent::Ready { .. }));
    assert!(matches!(recv(&a).await, ServerEvent::Ready { .. }));
}

#[tokio::test]
async fn creator_leave_event_closes_room_without_disconnect() {
    let (url, _relay) = start_relay().await;
    let (a, b) = paired(&url, "theta").await;

    a.leave().await.unwrap();
    assert!(matches!(recv(&b).await, ServerEvent::RoomClosed { .. }));

    // Both stay connected and can reuse the name.
    assert!(a.is_connected());
    a.create_or_join("theta").await.unwrap();
    assert!(matches!(recv(&a).await, ServerEvent::Created { .. }));
}

#[tokio::test]
async fn second_room_request_is_an_error() {
    let (url, _relay) = start_relay().await;
    let a = connect(&url).await;

    a.create_or_join("iota").await.unwrap();
    recv(&a).await;

    a.create_or_join("kappa").await.unwrap();
    assert!(matches!(recv(&a).await, ServerEvent::Error { .. }));
    assert_eq!(room_status(&a, "kappa").await, (false, 0));
}
