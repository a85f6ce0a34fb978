use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("session {0} is not valid")]
    SessionInvalid(String),

    #[error("no active session")]
    NoSession,

    #[error("relay api error: {0}")]
    Relay(#[from] reqwest::Error),

    #[error("signaling error: {0}")]
    Signaling(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("signaling connect timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("peer error: {0}")]
    Peer(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("input injection error: {0}")]
    Injection(String),

    #[error("overlay error: {0}")]
    Overlay(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
