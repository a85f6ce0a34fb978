//! Session orchestrator: owns the relay channel and every viewer's
//! [`PeerSession`], and routes each incoming message to its handler.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use base64::{engine::general_purpose, Engine as _};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSizeTracker, CaptureSource, CaptureStream};
use crate::config::HostConfig;
use crate::control::{ControlGate, ControlPolicy};
use crate::error::{HostError, Result};
use crate::input::{InputEvent, InputInjector, InputSynthesizer};
use crate::overlay::{OverlayController, OverlayManager};
use crate::peer::link::PeerConnector;
use crate::peer::session::{ConnectivityOutcome, PeerSession};
use crate::peer::state::PeerState;
use crate::peer::types::PeerEvent;
use crate::relay_api::RelayApi;
use crate::session::Session;
use crate::signaling::{
    self, ControlChannelMessage, IncomingMessage, OutgoingMessage, SignalingEvent, Signaler,
};
use crate::utils::clamp_ratio;

type SharedPeer = Arc<Mutex<PeerSession>>;

/// External collaborators the orchestrator drives.
pub struct Collaborators {
    pub relay: Arc<dyn RelayApi>,
    pub capture: Arc<dyn CaptureSource>,
    pub connector: Arc<dyn PeerConnector>,
    pub injector: Arc<dyn InputInjector>,
    pub overlay: Arc<dyn OverlayController>,
    pub control_policy: Arc<dyn ControlPolicy>,
}

#[derive(Default)]
struct Peers {
    sessions: HashMap<String, SharedPeer>,
    /// Viewers whose session is being built.
    creating: HashSet<String>,
}

pub struct SessionOrchestrator {
    config: HostConfig,
    relay: Arc<dyn RelayApi>,
    capture_source: Arc<dyn CaptureSource>,
    connector: Arc<dyn PeerConnector>,
    overlay: OverlayManager,
    synthesizer: InputSynthesizer,
    control: Arc<ControlGate>,
    capture_size: Arc<CaptureSizeTracker>,
    session: StdMutex<Session>,
    signaler: RwLock<Option<Arc<dyn Signaler>>>,
    peers: Mutex<Peers>,
    capture: Mutex<Option<Arc<dyn CaptureStream>>>,
    signaling_task: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionOrchestrator {
    pub fn new(config: HostConfig, collaborators: Collaborators) -> Arc<Self> {
        let capture_size = Arc::new(CaptureSizeTracker::default());
        let control = Arc::new(ControlGate::new(
            collaborators.control_policy,
            config.control_grant_delay(),
        ));
        Arc::new(Self {
            relay: collaborators.relay,
            capture_source: collaborators.capture,
            connector: collaborators.connector,
            overlay: OverlayManager::new(collaborators.overlay),
            synthesizer: InputSynthesizer::new(capture_size.clone(), collaborators.injector),
            control,
            session: StdMutex::new(Session::new(capture_size.clone())),
            capture_size,
            signaler: RwLock::new(None),
            peers: Mutex::new(Peers::default()),
            capture: Mutex::new(None),
            signaling_task: StdMutex::new(None),
            config,
        })
    }

    // ---------------------------------------------------------------------
    // Session lifecycle
    // ---------------------------------------------------------------------

    /// Validate `session_id` with the relay, open the signaling channel and
    /// start dispatching. A previous session is ended first.
    pub async fn connect(self: &Arc<Self>, session_id: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(HostError::SessionInvalid(String::new()));
        }
        if self.session_id().is_some() {
            self.end_session().await;
        }

        if !self.relay.validate_session(session_id).await? {
            warn!(session_id, "Relay rejected session");
            return Err(HostError::SessionInvalid(session_id.to_string()));
        }

        let (handle, events) = signaling::connect(
            &self.config.signaling_url,
            session_id,
            self.config.connect_timeout(),
        )
        .await?;
        self.attach_transport(session_id, Arc::new(handle), events)
            .await;
        Ok(())
    }

    /// Bind an already-open signaling channel to `session_id` and start the
    /// dispatch loop.
    pub async fn attach_transport(
        self: &Arc<Self>,
        session_id: &str,
        signaler: Arc<dyn Signaler>,
        events: mpsc::UnboundedReceiver<SignalingEvent>,
    ) {
        self.lock_session().begin(session_id);
        *self.signaler.write().unwrap_or_else(PoisonError::into_inner) = Some(signaler);

        let task = tokio::spawn(Arc::clone(self).run_signaling(events));
        if let Some(old) = self.lock_signaling_task().replace(task) {
            old.abort();
        }

        info!(session_id, "Session connected");
        self.report_status(session_id, true).await;
    }

    async fn run_signaling(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SignalingEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SignalingEvent::Opened => debug!("Signaling channel open"),
                SignalingEvent::Message(message) => self.handle_message(message).await,
                SignalingEvent::Closed => {
                    self.on_transport_closed().await;
                    break;
                }
            }
        }
    }

    async fn on_transport_closed(&self) {
        let session_id = {
            let mut session = self.lock_session();
            session.connected = false;
            session.session_id.clone()
        };
        warn!(?session_id, "Signaling channel closed");
        if let Some(session_id) = session_id {
            self.report_status(&session_id, false).await;
        }
    }

    /// Tear everything down: notify the relay, close every viewer, stop
    /// the capture and reset session state. Safe to call repeatedly; a
    /// failing step does not stop the ones after it.
    pub async fn end_session(&self) {
        let session_id = self.session_id();
        let signaler = self
            .signaler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let (Some(session_id), Some(signaler)) = (&session_id, &signaler) {
            signaler.send(OutgoingMessage::EndSession {
                session_id: session_id.clone(),
            });
        }

        let peers: Vec<SharedPeer> = {
            let mut peers = self.peers.lock().await;
            peers.creating.clear();
            peers.sessions.drain().map(|(_, peer)| peer).collect()
        };
        for peer in peers {
            peer.lock().await.close().await;
        }

        self.control.reset();

        if let Err(e) = self.overlay.hide() {
            warn!(error = %e, "Failed to remove privacy overlay");
        }

        if let Some(stream) = self.capture.lock().await.take() {
            if let Err(e) = stream.stop() {
                warn!(error = %e, "Failed to stop capture stream");
            }
        }

        if let Some(signaler) = signaler {
            signaler.close();
        }
        if let Some(task) = self.lock_signaling_task().take() {
            task.abort();
        }

        self.lock_session().reset();

        if let Some(session_id) = session_id {
            self.report_status(&session_id, false).await;
            info!(session_id = %session_id, "Session ended");
        }
    }

    async fn report_status(&self, session_id: &str, online: bool) {
        if let Err(e) = self.relay.report_host_status(session_id, online).await {
            warn!(session_id, online, error = %e, "Failed to report host status");
        }
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// Route one relay message.
    pub async fn handle_message(self: &Arc<Self>, message: IncomingMessage) {
        match message {
            IncomingMessage::ViewerJoined { viewer_id } => {
                self.handle_viewer_joined(&viewer_id).await;
            }
            IncomingMessage::RequestControl { viewer_id } => {
                self.control.request_control(&viewer_id);
                self.schedule_control_grant(&viewer_id);
            }
            IncomingMessage::ReleaseControl { viewer_id } => {
                self.control.release_control(viewer_id.as_deref());
            }
            IncomingMessage::InputEvent { event, .. } => self.handle_input(&event),
            IncomingMessage::WebrtcAnswer { viewer_id, sdp } => {
                let Some(peer) = self.peer(&viewer_id).await else {
                    debug!(viewer_id = %viewer_id, "Answer for unknown viewer dropped");
                    return;
                };
                if let Err(e) = peer.lock().await.on_answer(sdp).await {
                    warn!(viewer_id = %viewer_id, error = %e, "Failed to apply answer");
                };
            }
            IncomingMessage::IceCandidate {
                viewer_id,
                candidate,
            } => {
                let Some(peer) = self.peer(&viewer_id).await else {
                    debug!(viewer_id = %viewer_id, "Candidate for unknown viewer dropped");
                    return;
                };
                peer.lock().await.on_remote_candidate(candidate).await;
            }
            IncomingMessage::PrivacyModeOn => {
                if let Err(e) = self.overlay.show() {
                    warn!(error = %e, "Failed to create privacy overlay");
                }
            }
            IncomingMessage::PrivacyModeOff => {
                if let Err(e) = self.overlay.hide() {
                    warn!(error = %e, "Failed to destroy privacy overlay");
                }
            }
            IncomingMessage::Error { message } => {
                warn!(detail = message.as_deref().unwrap_or(""), "Relay reported an error");
            }
        }
    }

    /// Start building a session for `viewer_id` unless one exists or is
    /// already being built. Returns whether a new build was started.
    pub async fn handle_viewer_joined(self: &Arc<Self>, viewer_id: &str) -> bool {
        {
            let mut peers = self.peers.lock().await;
            if peers.sessions.contains_key(viewer_id)
                || !peers.creating.insert(viewer_id.to_string())
            {
                debug!(viewer_id, "Viewer already tracked, join ignored");
                return false;
            }
        }

        info!(viewer_id, "Viewer joined");
        let this = Arc::clone(self);
        let viewer_id = viewer_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.create_peer(&viewer_id).await {
                warn!(viewer_id = %viewer_id, error = %e, "Failed to set up viewer");
                this.peers.lock().await.creating.remove(&viewer_id);
            }
        });
        true
    }

    async fn create_peer(self: &Arc<Self>, viewer_id: &str) -> Result<()> {
        let (session_id, signaler) = self.active_transport().ok_or(HostError::NoSession)?;
        let capture = self.ensure_capture().await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = self
            .connector
            .connect(viewer_id, capture.tracks(), events_tx)
            .await?;
        let peer = Arc::new(Mutex::new(PeerSession::new(
            &session_id,
            viewer_id,
            link,
            signaler,
            self.config.max_renegotiations,
        )));

        // Hold the session while publishing it so an early answer waits
        // for the offer to go out.
        let mut guard = peer.lock().await;
        {
            let mut peers = self.peers.lock().await;
            if !peers.creating.remove(viewer_id) {
                // session ended while we were building
                drop(peers);
                guard.close().await;
                return Err(HostError::NoSession);
            }
            peers
                .sessions
                .insert(viewer_id.to_string(), Arc::clone(&peer));
        }

        let pump = tokio::spawn(Arc::clone(self).pump_peer_events(viewer_id.to_string(), events_rx));
        guard.set_pump(pump);

        if let Err(e) = guard.start().await {
            drop(guard);
            self.close_peer(viewer_id).await;
            return Err(e);
        }
        Ok(())
    }

    async fn pump_peer_events(
        self: Arc<Self>,
        viewer_id: String,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(peer) = self.peer(&viewer_id).await else {
                break;
            };
            self.handle_peer_event(&viewer_id, &peer, event).await;
        }
    }

    async fn handle_peer_event(self: &Arc<Self>, viewer_id: &str, peer: &SharedPeer, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                peer.lock().await.on_local_candidate(candidate);
            }
            PeerEvent::Connectivity(connectivity) => {
                let outcome = peer.lock().await.on_connectivity(connectivity).await;
                match outcome {
                    ConnectivityOutcome::Established => self.schedule_control_grant(viewer_id),
                    ConnectivityOutcome::GaveUp => self.close_peer(viewer_id).await,
                    _ => {}
                }
            }
            PeerEvent::ControlChannelOpen => debug!(viewer_id, "Control channel ready"),
            PeerEvent::ControlMessage(data) => {
                if peer.lock().await.state().is_closed() {
                    return;
                }
                match ControlChannelMessage::parse(&data) {
                    Some(ControlChannelMessage::InputEvent { event }) => self.handle_input(&event),
                    None => debug!(viewer_id, len = data.len(), "Unrecognized control message"),
                }
            }
            PeerEvent::ControlChannelClosed => debug!(viewer_id, "Control channel closed"),
        }
    }

    fn handle_input(&self, event: &InputEvent) {
        self.synthesizer.apply(event);
    }

    fn schedule_control_grant(&self, viewer_id: &str) {
        match self.active_transport() {
            Some((session_id, signaler)) => self.control.schedule(&session_id, viewer_id, signaler),
            None => debug!(viewer_id, "No session, control grant skipped"),
        }
    }

    /// Remove and close one viewer's session.
    pub async fn close_peer(&self, viewer_id: &str) {
        let peer = self.peers.lock().await.sessions.remove(viewer_id);
        if let Some(peer) = peer {
            peer.lock().await.close().await;
        }
    }

    // ---------------------------------------------------------------------
    // Capture
    // ---------------------------------------------------------------------

    async fn ensure_capture(&self) -> Result<Arc<dyn CaptureStream>> {
        let mut capture = self.capture.lock().await;
        if let Some(stream) = capture.as_ref() {
            return Ok(Arc::clone(stream));
        }
        let stream = self.capture_source.acquire().await?;
        let (width, height) = stream.dimensions();
        self.capture_size.set(width, height);
        *capture = Some(Arc::clone(&stream));
        info!(width, height, "Capture stream cached for session");
        Ok(stream)
    }

    /// Acquire the capture stream ahead of the first viewer.
    pub async fn start_capture(&self) -> Result<(u32, u32)> {
        let stream = self.ensure_capture().await?;
        Ok(stream.dimensions())
    }

    /// Stop and forget the cached capture stream. The next viewer acquires
    /// a fresh one.
    pub async fn stop_capture(&self) {
        if let Some(stream) = self.capture.lock().await.take() {
            if let Err(e) = stream.stop() {
                warn!(error = %e, "Failed to stop capture stream");
            }
            self.capture_size.set(0, 0);
        }
    }

    /// Send an encoded frame over the relay for viewers without a media path.
    pub fn broadcast_frame(&self, image: &[u8], width: u32, height: u32) -> Result<()> {
        let (session_id, signaler) = self.active_transport().ok_or(HostError::NoSession)?;
        signaler.send(OutgoingMessage::Frame {
            session_id,
            data: general_purpose::STANDARD.encode(image),
            width,
            height,
        });
        Ok(())
    }

    pub fn broadcast_cursor(&self, x_ratio: f64, y_ratio: f64) -> Result<()> {
        let (session_id, signaler) = self.active_transport().ok_or(HostError::NoSession)?;
        signaler.send(OutgoingMessage::Cursor {
            session_id,
            x_ratio: clamp_ratio(x_ratio),
            y_ratio: clamp_ratio(y_ratio),
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn session_id(&self) -> Option<String> {
        self.lock_session().session_id.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_session().connected
    }

    pub fn capture_size(&self) -> (u32, u32) {
        self.capture_size.get()
    }

    pub fn control(&self) -> &ControlGate {
        &self.control
    }

    pub fn overlay_active(&self) -> bool {
        self.overlay.is_active()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.sessions.len()
    }

    pub async fn peer_state(&self, viewer_id: &str) -> Option<PeerState> {
        let peer = self.peer(viewer_id).await?;
        let state = peer.lock().await.state();
        Some(state)
    }

    pub async fn has_capture(&self) -> bool {
        self.capture.lock().await.is_some()
    }

    async fn peer(&self, viewer_id: &str) -> Option<SharedPeer> {
        self.peers.lock().await.sessions.get(viewer_id).cloned()
    }

    fn active_transport(&self) -> Option<(String, Arc<dyn Signaler>)> {
        let session_id = self.session_id()?;
        let signaler = self
            .signaler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some((session_id, signaler))
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_signaling_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.signaling_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
