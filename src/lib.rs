//! Host side of a relay-brokered screen share.
//!
//! [`SessionOrchestrator`] owns the relay channel and one
//! [`PeerSession`](peer::PeerSession) per viewer. Screen capture, input
//! injection and the privacy overlay sit behind traits so each platform can
//! plug in its own backend.

pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod input;
pub mod logger;
pub mod orchestrator;
pub mod overlay;
pub mod peer;
pub mod relay_api;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::HostConfig;
pub use error::{HostError, Result};
pub use orchestrator::{Collaborators, SessionOrchestrator};
