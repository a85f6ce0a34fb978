mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use common::{connected, eventually, orchestrator, MockConnector, MockRelay, SESSION};
use sharehost_lib::peer::{Connectivity, PeerEvent, PeerState};
use sharehost_lib::signaling::{IncomingMessage, OutgoingMessage, SignalingEvent};
use sharehost_lib::HostError;

fn joined(viewer: &str) -> IncomingMessage {
    IncomingMessage::ViewerJoined {
        viewer_id: viewer.into(),
    }
}

async fn join_and_wait(h: &common::Harness, viewer: &str) {
    h.host.handle_message(joined(viewer)).await;
    eventually("offer", || async {
        h.host.peer_state(viewer).await == Some(PeerState::Offering)
    })
    .await;
}

#[tokio::test]
async fn concurrent_joins_build_one_session() {
    let h = connected(MockConnector {
        delay: Duration::from_millis(50),
        ..Default::default()
    })
    .await;

    h.host.handle_message(joined("v1")).await;
    h.host.handle_message(joined("v1")).await;
    let alias = IncomingMessage::parse(r#"{"type":"request_offer","fromViewerId":"v1"}"#).unwrap();
    h.host.handle_message(alias).await;

    eventually("offer", || async { !h.signaler.offers_to("v1").is_empty() }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.host.peer_count().await, 1);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.signaler.offers_to("v1"), vec![false]);

    // joining again once the session exists is also a no-op
    assert!(!h.host.handle_viewer_joined("v1").await);
}

#[tokio::test]
async fn first_viewer_acquires_capture_and_sizes_input() {
    let h = connected(MockConnector::default()).await;
    assert_eq!(h.host.capture_size(), (0, 0));
    assert!(!h.host.has_capture().await);

    join_and_wait(&h, "v1").await;
    join_and_wait(&h, "v2").await;

    assert!(h.host.has_capture().await);
    assert_eq!(h.host.capture_size(), (1920, 1080));
    assert_eq!(h.host.peer_count().await, 2);
}

#[tokio::test]
async fn answer_and_candidates_are_routed_to_their_viewer() {
    let h = connected(MockConnector::default()).await;
    join_and_wait(&h, "v1").await;

    let candidate = IncomingMessage::parse(
        r#"{"type":"ice_candidate","viewerId":"v1","candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
    )
    .unwrap();
    h.host.handle_message(candidate.clone()).await;
    h.host
        .handle_message(IncomingMessage::WebrtcAnswer {
            viewer_id: "v1".into(),
            sdp: "v=0 answer".into(),
        })
        .await;
    h.host.handle_message(candidate).await;

    let link = h.connector.link("v1").unwrap();
    assert_eq!(link.called("apply_answer"), 1);
    assert_eq!(link.called("add_candidate"), 2);
}

#[tokio::test]
async fn messages_for_unknown_viewers_are_dropped() {
    let h = connected(MockConnector::default()).await;

    h.host
        .handle_message(IncomingMessage::WebrtcAnswer {
            viewer_id: "ghost".into(),
            sdp: "v=0".into(),
        })
        .await;
    let candidate = IncomingMessage::parse(
        r#"{"type":"ice_candidate","viewerId":"ghost","candidate":{"candidate":"candidate:1"}}"#,
    )
    .unwrap();
    h.host.handle_message(candidate).await;

    assert_eq!(h.host.peer_count().await, 0);
    assert_eq!(h.host.peer_state("ghost").await, None);
    assert!(h.signaler.sent().is_empty());
}

#[tokio::test]
async fn local_candidates_reach_the_relay() {
    let h = connected(MockConnector::default()).await;
    join_and_wait(&h, "v1").await;

    h.connector.emit(
        "v1",
        PeerEvent::LocalCandidate(sharehost_lib::peer::IceCandidate {
            candidate: "candidate:2 1 udp 1 10.0.0.2 9 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }),
    );

    eventually("candidate", || async { h.signaler.count("ice_candidate") == 1 }).await;
}

#[tokio::test]
async fn connected_viewer_is_granted_control() {
    let h = connected(MockConnector::default()).await;
    join_and_wait(&h, "v1").await;

    h.connector
        .emit("v1", PeerEvent::Connectivity(Connectivity::Connected));

    eventually("control response", || async {
        h.signaler.sent().contains(&OutgoingMessage::ControlResponse {
            session_id: SESSION.into(),
            viewer_id: "v1".into(),
            approved: true,
        })
    })
    .await;
    assert_eq!(h.host.peer_state("v1").await, Some(PeerState::Connected));
    assert!(h.host.control().grant("v1").is_some());
}

#[tokio::test]
async fn connectivity_loss_sends_restart_offer() {
    let h = connected(MockConnector::default()).await;
    join_and_wait(&h, "v1").await;

    h.connector
        .emit("v1", PeerEvent::Connectivity(Connectivity::Connected));
    h.connector
        .emit("v1", PeerEvent::Connectivity(Connectivity::Failed));
    h.connector
        .emit("v1", PeerEvent::Connectivity(Connectivity::Disconnected));

    eventually("recovering", || async {
        h.host.peer_state("v1").await == Some(PeerState::Recovering)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.signaler.offers_to("v1"), vec![false, true]);
}

#[tokio::test]
async fn request_and_release_control() {
    let h = connected(MockConnector::default()).await;

    h.host
        .handle_message(IncomingMessage::RequestControl {
            viewer_id: "a".into(),
        })
        .await;
    h.host
        .handle_message(IncomingMessage::RequestControl {
            viewer_id: "b".into(),
        })
        .await;
    assert_eq!(h.host.control().pending_viewer().as_deref(), Some("b"));

    let release = IncomingMessage::ReleaseControl {
        viewer_id: Some("b".into()),
    };
    h.host.handle_message(release.clone()).await;
    h.host.handle_message(release).await;
    h.host
        .handle_message(IncomingMessage::ReleaseControl { viewer_id: None })
        .await;
    assert_eq!(h.host.control().pending_viewer(), None);
}

#[tokio::test]
async fn input_from_signaling_and_control_channel_is_injected() {
    let h = connected(MockConnector::default()).await;
    join_and_wait(&h, "v1").await;

    h.connector.emit(
        "v1",
        PeerEvent::ControlMessage(Bytes::from_static(
            br#"{"type":"input_event","event":{"type":"mouse_move","xRatio":0.5,"yRatio":0.5}}"#,
        )),
    );
    eventually("move", || async { !h.injector.moves.lock().unwrap().is_empty() }).await;
    assert_eq!(*h.injector.moves.lock().unwrap(), vec![(960, 540)]);

    let key = IncomingMessage::parse(
        r#"{"type":"input_event","viewerId":"v1","event":{"type":"key","action":"up","key":"a","code":"KeyA"}}"#,
    )
    .unwrap();
    h.host.handle_message(key).await;
    assert_eq!(h.injector.keys.lock().unwrap().len(), 1);

    // garbage on the control channel is skipped
    h.connector
        .emit("v1", PeerEvent::ControlMessage(Bytes::from_static(b"not json")));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.injector.moves.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn privacy_mode_toggles_overlay_once() {
    let h = connected(MockConnector::default()).await;

    h.host.handle_message(IncomingMessage::PrivacyModeOn).await;
    h.host.handle_message(IncomingMessage::PrivacyModeOn).await;
    assert!(h.host.overlay_active());
    h.host.handle_message(IncomingMessage::PrivacyModeOff).await;
    h.host.handle_message(IncomingMessage::PrivacyModeOff).await;

    assert!(!h.host.overlay_active());
    assert_eq!(h.overlay.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.overlay.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn end_session_tears_down_every_viewer_despite_failures() {
    let h = connected(MockConnector {
        fail_teardown: true,
        ..Default::default()
    })
    .await;
    join_and_wait(&h, "v1").await;
    join_and_wait(&h, "v2").await;
    h.host.handle_message(IncomingMessage::PrivacyModeOn).await;
    h.host
        .handle_message(IncomingMessage::RequestControl {
            viewer_id: "v1".into(),
        })
        .await;

    h.host.end_session().await;

    for viewer in ["v1", "v2"] {
        let link = h.connector.link(viewer).unwrap();
        assert_eq!(link.called("close_control_channel"), 1);
        assert_eq!(link.called("stop_tracks"), 1);
        assert_eq!(link.called("close"), 1);
    }
    assert_eq!(h.signaler.count("end_session"), 1);
    assert!(h.signaler.is_closed());
    assert_eq!(h.host.peer_count().await, 0);
    assert_eq!(h.host.session_id(), None);
    assert!(!h.host.is_connected());
    assert_eq!(h.host.capture_size(), (0, 0));
    assert!(!h.host.has_capture().await);
    assert!(!h.host.overlay_active());
    assert_eq!(h.host.control().pending_viewer(), None);
    assert_eq!(
        h.relay.statuses().last(),
        Some(&(SESSION.to_string(), false))
    );

    // second teardown is a no-op
    let reported = h.relay.statuses().len();
    h.host.end_session().await;
    assert_eq!(h.relay.statuses().len(), reported);
    assert_eq!(h.connector.link("v1").unwrap().called("close"), 1);
}

#[tokio::test]
async fn join_racing_teardown_leaves_nothing_behind() {
    let h = connected(MockConnector {
        delay: Duration::from_millis(50),
        ..Default::default()
    })
    .await;

    h.host.handle_message(joined("v1")).await;
    h.host.end_session().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.host.peer_count().await, 0);
    assert!(h.signaler.offers_to("v1").is_empty());
}

#[tokio::test]
async fn broadcasts_require_a_session() {
    let h = orchestrator(MockConnector::default(), MockRelay::new(true));
    assert!(matches!(
        h.host.broadcast_cursor(0.5, 0.5),
        Err(HostError::NoSession)
    ));

    let h = connected(MockConnector::default()).await;
    h.host.broadcast_frame(b"jpeg", 640, 480).unwrap();
    h.host.broadcast_cursor(1.5, -0.2).unwrap();

    let sent = h.signaler.sent();
    assert_eq!(
        sent[0],
        OutgoingMessage::Frame {
            session_id: SESSION.into(),
            data: "anBlZw==".into(),
            width: 640,
            height: 480,
        }
    );
    assert_eq!(
        sent[1],
        OutgoingMessage::Cursor {
            session_id: SESSION.into(),
            x_ratio: 1.0,
            y_ratio: 0.0,
        }
    );
}

#[tokio::test]
async fn invalid_session_is_rejected_before_connecting() {
    let h = orchestrator(MockConnector::default(), MockRelay::new(false));

    let err = h.host.connect("nope").await.unwrap_err();
    assert!(matches!(err, HostError::SessionInvalid(id) if id == "nope"));
    assert_eq!(h.host.session_id(), None);
    assert!(h.relay.statuses().is_empty());
}

#[tokio::test]
async fn closed_transport_marks_host_offline() {
    let h = connected(MockConnector::default()).await;
    assert!(h.host.is_connected());
    assert_eq!(h.relay.statuses(), vec![(SESSION.to_string(), true)]);

    h.events.send(SignalingEvent::Closed).unwrap();

    eventually("offline", || async { !h.host.is_connected() }).await;
    eventually("status", || async {
        h.relay.statuses().last() == Some(&(SESSION.to_string(), false))
    })
    .await;
    assert_eq!(h.host.session_id().as_deref(), Some(SESSION));
}

#[tokio::test]
async fn signaling_messages_are_dispatched() {
    let h = connected(MockConnector::default()).await;

    let joined = IncomingMessage::parse(r#"{"type":"viewer_joined","viewerId":"v9"}"#).unwrap();
    h.events.send(SignalingEvent::Message(joined)).unwrap();

    eventually("offer", || async { h.signaler.offers_to("v9") == vec![false] }).await;
}
