//! Capture surface state and the capture-stream collaborator.

use crate::error::{HostError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// Current capture surface size in device pixels. `(0, 0)` until a stream
/// reports its dimensions.
#[derive(Debug, Default)]
pub struct CaptureSizeTracker {
    size: RwLock<(u32, u32)>,
}

impl CaptureSizeTracker {
    pub fn set(&self, width: u32, height: u32) {
        if let Ok(mut size) = self.size.write() {
            *size = (width, height);
        }
    }

    pub fn get(&self) -> (u32, u32) {
        self.size.read().map(|size| *size).unwrap_or((0, 0))
    }
}

/// A live capture stream shared by every viewer connection.
pub trait CaptureStream: Send + Sync {
    fn tracks(&self) -> Vec<LocalTrack>;
    fn dimensions(&self) -> (u32, u32);
    fn stop(&self) -> Result<()>;
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn CaptureStream>>;
}

/// One VP8 sample track of a fixed size. Frames are written into
/// [`StaticVideoCapture::track`] by whatever paints the screen.
pub struct StaticVideoCapture {
    track: Arc<TrackLocalStaticSample>,
    width: u32,
    height: u32,
    stopped: AtomicBool,
}

impl StaticVideoCapture {
    pub fn new(width: u32, height: u32) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "screen".to_owned(),
            "sharehost".to_owned(),
        ));
        Self {
            track,
            width,
            height,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl CaptureStream for StaticVideoCapture {
    fn tracks(&self) -> Vec<LocalTrack> {
        vec![self.track.clone() as LocalTrack]
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(HostError::Capture("capture already stopped".into()));
        }
        info!(width = self.width, height = self.height, "Capture stream stopped");
        Ok(())
    }
}

/// Hands out a fresh [`StaticVideoCapture`] per acquisition.
pub struct StaticCaptureSource {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
impl CaptureSource for StaticCaptureSource {
    async fn acquire(&self) -> Result<Arc<dyn CaptureStream>> {
        if self.width == 0 || self.height == 0 {
            return Err(HostError::Capture(format!(
                "invalid capture size {}x{}",
                self.width, self.height
            )));
        }
        info!(width = self.width, height = self.height, "Capture stream acquired");
        Ok(Arc::new(StaticVideoCapture::new(self.width, self.height)))
    }
}
