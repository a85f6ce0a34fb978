use std::fmt;

/// Lifecycle of one viewer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Joining,
    Offering,
    Connected,
    Recovering,
    Closed,
}

impl PeerState {
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Joining => "joining",
            Self::Offering => "offering",
            Self::Connected => "connected",
            Self::Recovering => "recovering",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}
