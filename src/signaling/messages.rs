//! Relay wire format: JSON text frames tagged by `type`.

use crate::input::InputEvent;
use crate::peer::types::IceCandidate;
use serde::{Deserialize, Serialize};

/// Messages the host sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutgoingMessage {
    Register {
        session_id: String,
        role: String,
    },
    Frame {
        session_id: String,
        /// Base64-encoded image bytes.
        data: String,
        width: u32,
        height: u32,
    },
    Cursor {
        session_id: String,
        x_ratio: f64,
        y_ratio: f64,
    },
    ControlResponse {
        session_id: String,
        viewer_id: String,
        approved: bool,
    },
    EndSession {
        session_id: String,
    },
    WebrtcOffer {
        session_id: String,
        to_viewer_id: String,
        sdp: String,
        renegotiate: bool,
    },
    IceCandidate {
        session_id: String,
        to_viewer_id: String,
        candidate: IceCandidate,
    },
}

impl OutgoingMessage {
    pub fn register(session_id: &str) -> Self {
        Self::Register {
            session_id: session_id.to_string(),
            role: "host".into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Frame { .. } => "frame",
            Self::Cursor { .. } => "cursor",
            Self::ControlResponse { .. } => "control_response",
            Self::EndSession { .. } => "end_session",
            Self::WebrtcOffer { .. } => "webrtc_offer",
            Self::IceCandidate { .. } => "ice_candidate",
        }
    }
}

/// Messages the relay delivers to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum IncomingMessage {
    #[serde(alias = "request_offer")]
    ViewerJoined {
        #[serde(alias = "fromViewerId")]
        viewer_id: String,
    },
    RequestControl {
        #[serde(alias = "fromViewerId")]
        viewer_id: String,
    },
    ReleaseControl {
        #[serde(default, alias = "fromViewerId")]
        viewer_id: Option<String>,
    },
    InputEvent {
        #[serde(default, alias = "fromViewerId")]
        viewer_id: Option<String>,
        event: InputEvent,
    },
    WebrtcAnswer {
        #[serde(alias = "fromViewerId")]
        viewer_id: String,
        sdp: String,
    },
    IceCandidate {
        #[serde(alias = "fromViewerId")]
        viewer_id: String,
        candidate: IceCandidate,
    },
    PrivacyModeOn,
    PrivacyModeOff,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

impl IncomingMessage {
    /// Decode a text frame. Malformed and unknown messages yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Frames on a viewer's control data channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlChannelMessage {
    InputEvent { event: InputEvent },
}

impl ControlChannelMessage {
    pub fn parse(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}
