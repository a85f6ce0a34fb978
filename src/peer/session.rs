//! Per-viewer connection state machine.
//!
//! `Joining -> Offering -> Connected <-> Recovering`, with `Closed` reachable
//! from anywhere. A failure while `Connected` triggers one ICE-restart offer.
//! Failure reports while that offer is unanswered belong to the same outage
//! and are ignored; a failure after the restart answer, or after the offer
//! could not be created, starts another round.

use crate::error::{HostError, Result};
use crate::peer::ice::{analyze_candidate, PendingCandidates};
use crate::peer::link::PeerLink;
use crate::peer::state::PeerState;
use crate::peer::types::{Connectivity, IceCandidate};
use crate::signaling::{OutgoingMessage, Signaler};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a connectivity change meant for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityOutcome {
    Unchanged,
    /// First healthy connection for this viewer.
    Established,
    Recovered,
    Renegotiating,
    /// The renegotiation budget is spent; the caller should close the peer.
    GaveUp,
}

pub struct PeerSession {
    session_id: String,
    viewer_id: String,
    state: PeerState,
    link: Arc<dyn PeerLink>,
    signaler: Arc<dyn Signaler>,
    pending: PendingCandidates,
    remote_description_set: bool,
    /// An ICE-restart offer went out and its answer has not been applied.
    restart_outstanding: bool,
    ever_connected: bool,
    renegotiations: u32,
    max_renegotiations: Option<u32>,
    pump: Option<JoinHandle<()>>,
}

impl PeerSession {
    pub fn new(
        session_id: &str,
        viewer_id: &str,
        link: Arc<dyn PeerLink>,
        signaler: Arc<dyn Signaler>,
        max_renegotiations: Option<u32>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            viewer_id: viewer_id.to_string(),
            state: PeerState::Joining,
            link,
            signaler,
            pending: PendingCandidates::default(),
            remote_description_set: false,
            restart_outstanding: false,
            ever_connected: false,
            renegotiations: 0,
            max_renegotiations,
            pump: None,
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn renegotiations(&self) -> u32 {
        self.renegotiations
    }

    /// Task delivering this viewer's [`PeerEvent`](crate::peer::PeerEvent)s.
    /// Aborted on close.
    pub fn set_pump(&mut self, pump: JoinHandle<()>) {
        if let Some(old) = self.pump.replace(pump) {
            old.abort();
        }
    }

    /// Send the initial offer. `Joining -> Offering`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != PeerState::Joining {
            return Err(HostError::Peer(format!(
                "cannot start viewer {} in state {}",
                self.viewer_id, self.state
            )));
        }
        let sdp = self.link.create_offer(false).await?;
        self.send_offer(sdp, false);
        self.state = PeerState::Offering;
        info!(viewer_id = %self.viewer_id, "Offer sent");
        Ok(())
    }

    pub async fn on_answer(&mut self, sdp: String) -> Result<()> {
        let expected = match self.state {
            PeerState::Offering => true,
            PeerState::Recovering => self.restart_outstanding,
            _ => false,
        };
        if !expected {
            debug!(viewer_id = %self.viewer_id, state = %self.state, "Ignoring unexpected answer");
            return Ok(());
        }
        self.link.apply_answer(sdp).await?;
        self.remote_description_set = true;
        self.restart_outstanding = false;
        if !self.pending.is_empty() {
            self.pending.flush(&self.viewer_id, self.link.as_ref()).await;
        }
        debug!(viewer_id = %self.viewer_id, "Remote answer applied");
        Ok(())
    }

    /// Apply a remote candidate, or queue it until the answer is in.
    pub async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_closed() {
            return;
        }
        if !self.remote_description_set {
            debug!(viewer_id = %self.viewer_id, "Remote description not set yet, queuing candidate");
            self.pending.push(candidate);
            return;
        }
        if let Err(e) = self.link.add_remote_candidate(candidate).await {
            warn!(viewer_id = %self.viewer_id, error = %e, "Failed to add ICE candidate");
        }
    }

    /// Trickle a locally gathered candidate to the viewer.
    pub fn on_local_candidate(&self, candidate: IceCandidate) {
        if self.state.is_closed() {
            return;
        }
        analyze_candidate(&self.viewer_id, &candidate);
        self.signaler.send(OutgoingMessage::IceCandidate {
            session_id: self.session_id.clone(),
            to_viewer_id: self.viewer_id.clone(),
            candidate,
        });
    }

    pub async fn on_connectivity(&mut self, connectivity: Connectivity) -> ConnectivityOutcome {
        if self.state.is_closed() {
            return ConnectivityOutcome::Unchanged;
        }

        match connectivity {
            Connectivity::Connected => match self.state {
                PeerState::Offering | PeerState::Recovering => {
                    let recovering = self.state == PeerState::Recovering;
                    self.state = PeerState::Connected;
                    if !self.ever_connected {
                        self.ever_connected = true;
                        info!(viewer_id = %self.viewer_id, "Viewer connected");
                        ConnectivityOutcome::Established
                    } else {
                        info!(viewer_id = %self.viewer_id, recovering, "Viewer connection recovered");
                        ConnectivityOutcome::Recovered
                    }
                }
                _ => ConnectivityOutcome::Unchanged,
            },
            c if c.is_broken() => match self.state {
                PeerState::Connected => self.renegotiate().await,
                PeerState::Recovering if self.restart_outstanding => {
                    debug!(viewer_id = %self.viewer_id, ?c, "Restart offer pending, waiting for answer");
                    ConnectivityOutcome::Unchanged
                }
                PeerState::Recovering => self.renegotiate().await,
                _ => {
                    debug!(viewer_id = %self.viewer_id, ?c, state = %self.state, "Connectivity problem before connect");
                    ConnectivityOutcome::Unchanged
                }
            },
            other => {
                debug!(viewer_id = %self.viewer_id, ?other, "Connectivity changed");
                ConnectivityOutcome::Unchanged
            }
        }
    }

    async fn renegotiate(&mut self) -> ConnectivityOutcome {
        if let Some(max) = self.max_renegotiations {
            if self.renegotiations >= max {
                warn!(viewer_id = %self.viewer_id, max, "Renegotiation limit reached");
                return ConnectivityOutcome::GaveUp;
            }
        }
        self.renegotiations += 1;
        self.state = PeerState::Recovering;
        // candidates for the new ICE generation wait for the restart answer
        self.remote_description_set = false;
        info!(viewer_id = %self.viewer_id, attempt = self.renegotiations, "Renegotiating after connectivity loss");

        match self.link.create_offer(true).await {
            Ok(sdp) => {
                self.send_offer(sdp, true);
                self.restart_outstanding = true;
            }
            Err(e) => {
                warn!(viewer_id = %self.viewer_id, error = %e, "Failed to create renegotiation offer");
                self.restart_outstanding = false;
            }
        }
        ConnectivityOutcome::Renegotiating
    }

    fn send_offer(&self, sdp: String, renegotiate: bool) {
        self.signaler.send(OutgoingMessage::WebrtcOffer {
            session_id: self.session_id.clone(),
            to_viewer_id: self.viewer_id.clone(),
            sdp,
            renegotiate,
        });
    }

    /// Release the control channel, outbound tracks and the connection.
    /// Every step runs even when an earlier one fails. Idempotent.
    pub async fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.state = PeerState::Closed;
        self.pending.clear();

        if let Err(e) = self.link.close_control_channel().await {
            warn!(viewer_id = %self.viewer_id, error = %e, "Failed to close control channel");
        }
        if let Err(e) = self.link.stop_tracks().await {
            warn!(viewer_id = %self.viewer_id, error = %e, "Failed to stop outbound tracks");
        }
        if let Err(e) = self.link.close().await {
            warn!(viewer_id = %self.viewer_id, error = %e, "Failed to close peer connection");
        }
        info!(viewer_id = %self.viewer_id, "Peer session closed");

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
