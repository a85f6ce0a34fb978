pub mod messages;
pub mod transport;

pub use messages::{ControlChannelMessage, IncomingMessage, OutgoingMessage};
pub use transport::{connect, SignalingHandle};

/// Events surfaced by the relay connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Opened,
    Message(IncomingMessage),
    Closed,
}

/// Outgoing side of the relay channel.
///
/// `send` is fire-and-forget: when the channel is not open the message is
/// dropped.
pub trait Signaler: Send + Sync {
    fn send(&self, message: OutgoingMessage);
    fn is_open(&self) -> bool;
    fn close(&self);
}
