use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Native window that hides the host's screen from viewers while staying
/// invisible to the capture itself.
pub trait OverlayController: Send + Sync {
    fn create_overlay(&self) -> Result<()>;
    fn destroy_overlay(&self) -> Result<()>;
}

/// Backend for platforms without a native overlay.
#[derive(Debug, Default)]
pub struct NoopOverlay;

impl OverlayController for NoopOverlay {
    fn create_overlay(&self) -> Result<()> {
        debug!("privacy overlay not supported on this platform");
        Ok(())
    }

    fn destroy_overlay(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps track of whether an overlay is up so `hide` only reaches the
/// backend when there is something to destroy.
pub struct OverlayManager {
    backend: Arc<dyn OverlayController>,
    active: AtomicBool,
}

impl OverlayManager {
    pub fn new(backend: Arc<dyn OverlayController>) -> Self {
        Self {
            backend,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn show(&self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }
        self.backend.create_overlay()?;
        self.active.store(true, Ordering::SeqCst);
        info!("Privacy overlay shown");
        Ok(())
    }

    pub fn hide(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.destroy_overlay()?;
        info!("Privacy overlay hidden");
        Ok(())
    }
}
