//! Control-grant decisions.
//!
//! Tracks the single viewer whose control request is pending and answers
//! requests with a `control_response` after the configured delay.

use crate::signaling::{OutgoingMessage, Signaler};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Approval policy for control requests.
pub trait ControlPolicy: Send + Sync {
    fn decide(&self, viewer_id: &str) -> bool;
}

/// Approve every request.
#[derive(Debug, Default)]
pub struct AlwaysApprove;

impl ControlPolicy for AlwaysApprove {
    fn decide(&self, _viewer_id: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlGrant {
    pub viewer_id: String,
    pub approved: bool,
    pub decided_at: DateTime<Utc>,
}

pub struct ControlGate {
    policy: Arc<dyn ControlPolicy>,
    delay: Duration,
    pending: Mutex<Option<String>>,
    grants: Mutex<HashMap<String, ControlGrant>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ControlGate {
    pub fn new(policy: Arc<dyn ControlPolicy>, delay: Duration) -> Self {
        Self {
            policy,
            delay,
            pending: Mutex::new(None),
            grants: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Mark `viewer_id` as the pending control target, replacing any other.
    pub fn request_control(&self, viewer_id: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(viewer_id.to_string()) {
            if previous != viewer_id {
                debug!(previous = %previous, viewer_id, "Pending control request replaced");
            }
        }
    }

    /// Clear the pending indicator whoever holds it, and drop the viewer's
    /// grant.
    pub fn release_control(&self, viewer_id: Option<&str>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(viewer_id) = viewer_id {
            self.grants
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(viewer_id);
            if let Some(timer) = self
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(viewer_id)
            {
                timer.abort();
            }
            info!(viewer_id, "Control released");
        }
    }

    pub fn pending_viewer(&self) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn grant(&self, viewer_id: &str) -> Option<ControlGrant> {
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(viewer_id)
            .cloned()
    }

    /// Ask the policy, record the grant and tell the viewer.
    pub fn decide(&self, session_id: &str, viewer_id: &str, signaler: &dyn Signaler) -> ControlGrant {
        let approved = self.policy.decide(viewer_id);
        let grant = ControlGrant {
            viewer_id: viewer_id.to_string(),
            approved,
            decided_at: Utc::now(),
        };
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(viewer_id.to_string(), grant.clone());

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.as_deref() == Some(viewer_id) {
                pending.take();
            }
        }

        signaler.send(OutgoingMessage::ControlResponse {
            session_id: session_id.to_string(),
            viewer_id: viewer_id.to_string(),
            approved,
        });
        info!(viewer_id, approved, "Control decision sent");
        grant
    }

    /// Run [`ControlGate::decide`] after the configured delay. A newer
    /// schedule for the same viewer replaces an older one.
    pub fn schedule(self: &Arc<Self>, session_id: &str, viewer_id: &str, signaler: Arc<dyn Signaler>) {
        let gate = Arc::clone(self);
        let session_id = session_id.to_string();
        let viewer = viewer_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(gate.delay).await;
            gate.timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&viewer);
            gate.decide(&session_id, &viewer, signaler.as_ref());
        });

        if let Some(old) = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(viewer_id.to_string(), handle)
        {
            old.abort();
        }
    }

    /// Forget everything and cancel outstanding decisions.
    pub fn reset(&self) {
        for (_, timer) in self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            timer.abort();
        }
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
