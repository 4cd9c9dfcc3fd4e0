//! Connection lifecycle state machine

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by main and sub-connections
///
/// ```text
/// New ──▶ Connecting ──▶ Connected
///  │          │  │           │  │
///  │          │  └─▶ Failed ◀┘  │
///  └──────────┴──▶ Closed ◀─────┘
/// ```
///
/// `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, `start()` not yet called
    New,
    /// Negotiation in progress
    Connecting,
    /// Negotiated and usable
    Connected,
    /// Stopped locally or closed by the transport
    Closed,
    /// Negotiation or transport failure
    Failed,
}

impl ConnectionState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (New, Connecting)
                | (New, Closed)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Connected, Closed)
                | (Connected, Failed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
