use crate::peer::link::PeerLink;
use crate::peer::types::IceCandidate;
use tracing::{debug, warn};

/// Remote candidates that arrived before the remote description.
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: Vec<IceCandidate>,
}

impl PendingCandidates {
    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push(candidate);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Apply every queued candidate in arrival order. Individual failures
    /// are logged and skipped.
    pub async fn flush(&mut self, viewer_id: &str, link: &dyn PeerLink) {
        for candidate in self.queue.drain(..) {
            debug!(viewer_id, candidate = %candidate.candidate, "Applying pending candidate");
            if let Err(e) = link.add_remote_candidate(candidate).await {
                warn!(viewer_id, error = %e, "Failed to apply pending candidate");
            }
        }
    }
}

/// Log the candidate type (`host`, `srflx`, `relay`).
pub fn analyze_candidate(viewer_id: &str, candidate: &IceCandidate) {
    let kind = if candidate.candidate.contains("typ host") {
        "host"
    } else if candidate.candidate.contains("typ srflx") {
        "srflx"
    } else if candidate.candidate.contains("typ relay") {
        "relay"
    } else {
        "other"
    };
    debug!(viewer_id, kind, "Local ICE candidate gathered");
}
