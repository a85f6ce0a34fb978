use crate::capture::CaptureSizeTracker;
use std::sync::Arc;

/// Session-wide state owned by the orchestrator.
///
/// Capture dimensions live in the shared [`CaptureSizeTracker`] so the input
/// synthesizer can read them without going through the orchestrator.
#[derive(Debug, Default)]
pub struct Session {
    pub session_id: Option<String>,
    pub connected: bool,
    pub capture_size: Arc<CaptureSizeTracker>,
}

impl Session {
    pub fn new(capture_size: Arc<CaptureSizeTracker>) -> Self {
        Self {
            session_id: None,
            connected: false,
            capture_size,
        }
    }

    pub fn begin(&mut self, session_id: &str) {
        self.session_id = Some(session_id.to_string());
        self.connected = true;
    }

    /// Back to empty and disconnected, capture size zeroed.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.connected = false;
        self.capture_size.set(0, 0);
    }

    pub fn is_active(&self) -> bool {
        self.session_id.is_some()
    }
}
