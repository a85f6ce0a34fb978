use crate::capture::LocalTrack;
use crate::error::Result;
use crate::peer::types::{IceCandidate, PeerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One negotiated connection to a viewer, plus its control channel.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create an offer, set it as the local description and return its SDP.
    async fn create_offer(&self, ice_restart: bool) -> Result<String>;
    async fn apply_answer(&self, sdp: String) -> Result<()>;
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close_control_channel(&self) -> Result<()>;
    async fn stop_tracks(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Builds a [`PeerLink`] for a viewer. Callbacks from the link are posted
/// on `events`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        viewer_id: &str,
        tracks: Vec<LocalTrack>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>>;
}
