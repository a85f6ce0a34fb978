pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod link;
pub mod session;
pub mod state;
pub mod types;

pub use connection::{RtcPeerConnector, RtcPeerLink};
pub use link::{PeerConnector, PeerLink};
pub use session::{ConnectivityOutcome, PeerSession};
pub use state::PeerState;
pub use types::{Connectivity, IceCandidate, PeerEvent};
