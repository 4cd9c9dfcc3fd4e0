//! Connection state machine, relay connection and peer sub-connections

mod base;
mod main_connection;
mod state;
mod sub_connection;

pub use base::{Connection, ConnectedPeer, ConnectionCore, ConnectionEvent, LocalDescriptionKind};
pub use main_connection::MainConnection;
pub use state::ConnectionState;
pub use sub_connection::SubConnection;

/// Names of the events published on a connection's own bus
pub mod events {
    pub const CONNECTION_STATE_CHANGE: &str = "connectionStateChange";
    pub const REMOTE_STREAM_CHANGE: &str = "remoteStreamChange";
    pub const CONNECTED_PEERS_CHANGE: &str = "connectedPeersChange";
    /// Emitted by a sub-connection once it has been stopped
    pub const CONNECTION_CLOSED: &str = "connectionClosed";
}
