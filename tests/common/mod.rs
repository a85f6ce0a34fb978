#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sharehost_lib::capture::{LocalTrack, StaticCaptureSource};
use sharehost_lib::control::AlwaysApprove;
use sharehost_lib::input::{InputInjector, KeyAction, Modifiers, MouseButton};
use sharehost_lib::overlay::OverlayController;
use sharehost_lib::peer::{IceCandidate, PeerConnector, PeerEvent, PeerLink};
use sharehost_lib::relay_api::RelayApi;
use sharehost_lib::signaling::{OutgoingMessage, SignalingEvent, Signaler};
use sharehost_lib::{Collaborators, HostConfig, HostError, Result, SessionOrchestrator};
use tokio::sync::mpsc;

pub const SESSION: &str = "session-1";

#[derive(Default)]
pub struct RecordingSignaler {
    sent: Mutex<Vec<OutgoingMessage>>,
    closed: AtomicBool,
}

impl RecordingSignaler {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn offers_to(&self, viewer: &str) -> Vec<bool> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                OutgoingMessage::WebrtcOffer {
                    to_viewer_id,
                    renegotiate,
                    ..
                } if to_viewer_id == viewer => Some(renegotiate),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent().iter().filter(|m| m.kind() == kind).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Signaler for RecordingSignaler {
    fn send(&self, message: OutgoingMessage) {
        if !self.is_closed() {
            self.sent.lock().unwrap().push(message);
        }
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockRelay {
    pub valid: bool,
    pub statuses: Mutex<Vec<(String, bool)>>,
}

impl MockRelay {
    pub fn new(valid: bool) -> Self {
        Self {
            valid,
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(&self) -> Vec<(String, bool)> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn validate_session(&self, _session_id: &str) -> Result<bool> {
        Ok(self.valid)
    }

    async fn report_host_status(&self, session_id: &str, online: bool) -> Result<()> {
        self.statuses
            .lock()
            .unwrap()
            .push((session_id.to_string(), online));
        Ok(())
    }
}

/// Records every call; optionally fails the teardown steps.
#[derive(Default)]
pub struct MockLink {
    pub calls: Mutex<Vec<String>>,
    pub fail_teardown: bool,
    fail_restart: AtomicBool,
    offers: AtomicUsize,
}

impl MockLink {
    pub fn failing() -> Self {
        Self {
            fail_teardown: true,
            ..Default::default()
        }
    }

    /// Make ICE-restart offers fail until switched back.
    pub fn fail_restart_offers(&self, fail: bool) {
        self.fail_restart.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn teardown(&self, name: &str) -> Result<()> {
        self.record(name);
        if self.fail_teardown {
            return Err(HostError::Peer(format!("{name} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for MockLink {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        self.record(if ice_restart { "restart_offer" } else { "offer" });
        if ice_restart && self.fail_restart.load(Ordering::SeqCst) {
            return Err(HostError::Peer("ice restart rejected".into()));
        }
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("v=0 offer {n}"))
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        self.record("apply_answer");
        Ok(())
    }

    async fn add_remote_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        self.record("add_candidate");
        Ok(())
    }

    async fn close_control_channel(&self) -> Result<()> {
        self.teardown("close_control_channel")
    }

    async fn stop_tracks(&self) -> Result<()> {
        self.teardown("stop_tracks")
    }

    async fn close(&self) -> Result<()> {
        self.teardown("close")
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub delay: Duration,
    pub fail_teardown: bool,
    pub connects: AtomicUsize,
    pub links: Mutex<HashMap<String, Arc<MockLink>>>,
    pub events: Mutex<HashMap<String, mpsc::UnboundedSender<PeerEvent>>>,
}

impl MockConnector {
    pub fn link(&self, viewer: &str) -> Option<Arc<MockLink>> {
        self.links.lock().unwrap().get(viewer).cloned()
    }

    /// Inject a callback as if the connection produced it.
    pub fn emit(&self, viewer: &str, event: PeerEvent) {
        let events = self.events.lock().unwrap();
        events
            .get(viewer)
            .expect("viewer connected")
            .send(event)
            .expect("pump running");
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn connect(
        &self,
        viewer_id: &str,
        _tracks: Vec<LocalTrack>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let link = Arc::new(if self.fail_teardown {
            MockLink::failing()
        } else {
            MockLink::default()
        });
        self.links
            .lock()
            .unwrap()
            .insert(viewer_id.to_string(), link.clone());
        self.events
            .lock()
            .unwrap()
            .insert(viewer_id.to_string(), events);
        Ok(link)
    }
}

#[derive(Default)]
pub struct RecordingInjector {
    pub moves: Mutex<Vec<(i32, i32)>>,
    pub clicks: Mutex<Vec<MouseButton>>,
    pub keys: Mutex<Vec<(KeyAction, String)>>,
}

impl InputInjector for RecordingInjector {
    fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.moves.lock().unwrap().push((x, y));
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<()> {
        self.clicks.lock().unwrap().push(button);
        Ok(())
    }

    fn key(&self, action: KeyAction, key: &str, _code: &str, _mods: Modifiers) -> Result<()> {
        self.keys.lock().unwrap().push((action, key.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingOverlay {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl OverlayController for CountingOverlay {
    fn create_overlay(&self) -> Result<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy_overlay(&self) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub host: Arc<SessionOrchestrator>,
    pub signaler: Arc<RecordingSignaler>,
    pub relay: Arc<MockRelay>,
    pub connector: Arc<MockConnector>,
    pub injector: Arc<RecordingInjector>,
    pub overlay: Arc<CountingOverlay>,
    pub events: mpsc::UnboundedSender<SignalingEvent>,
}

pub fn config() -> HostConfig {
    HostConfig {
        control_grant_delay_ms: 0,
        ..HostConfig::default()
    }
}

pub fn orchestrator(connector: MockConnector, relay: MockRelay) -> Harness {
    let connector = Arc::new(connector);
    let relay = Arc::new(relay);
    let injector = Arc::new(RecordingInjector::default());
    let overlay = Arc::new(CountingOverlay::default());
    let host = SessionOrchestrator::new(
        config(),
        Collaborators {
            relay: relay.clone(),
            capture: Arc::new(StaticCaptureSource {
                width: 1920,
                height: 1080,
            }),
            connector: connector.clone(),
            injector: injector.clone(),
            overlay: overlay.clone(),
            control_policy: Arc::new(AlwaysApprove),
        },
    );
    let (events, _) = mpsc::unbounded_channel();
    Harness {
        host,
        signaler: Arc::new(RecordingSignaler::default()),
        relay,
        connector,
        injector,
        overlay,
        events,
    }
}

/// Orchestrator with a session already attached to a recording signaler.
pub async fn connected(connector: MockConnector) -> Harness {
    let mut harness = orchestrator(connector, MockRelay::new(true));
    let (tx, rx) = mpsc::unbounded_channel();
    harness
        .host
        .attach_transport(SESSION, harness.signaler.clone(), rx)
        .await;
    harness.events = tx;
    harness
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
