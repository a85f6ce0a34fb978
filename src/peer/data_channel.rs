use crate::peer::types::PeerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

pub const CONTROL_CHANNEL_LABEL: &str = "control";

/// Forward the control channel's open/message/close callbacks as
/// [`PeerEvent`]s.
pub fn attach_control_channel(
    viewer_id: &str,
    dc: &Arc<RTCDataChannel>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    dc.on_open(Box::new({
        let events = events.clone();
        let viewer_id = viewer_id.to_string();
        move || {
            debug!(viewer_id = %viewer_id, "Control channel opened");
            let _ = events.send(PeerEvent::ControlChannelOpen);
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let events = events.clone();
        move |msg: DataChannelMessage| {
            let _ = events.send(PeerEvent::ControlMessage(msg.data));
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new({
        let viewer_id = viewer_id.to_string();
        move || {
            debug!(viewer_id = %viewer_id, "Control channel closed");
            let _ = events.send(PeerEvent::ControlChannelClosed);
            Box::pin(async {})
        }
    }));
}
