//! Connection core for Experimental Hub clients
//!
//! A hub client holds one [`MainConnection`] to the relay. The relay
//! forwards peer offers over the reliable message channel; each offer
//! becomes a [`SubConnection`] carrying that peer's media.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Application (UI / state layer)                      │
//! │  ↑ events: connectionStateChange, remoteStreamChange │
//! │  ↑         connectedPeersChange, api.<TYPE>          │
//! │  MainConnection ── Negotiator (initial offer/answer) │
//! │  ├─ ReliableChannel  {"type", "data"} envelopes      │
//! │  ├─ PeerTransport    relay media                     │
//! │  └─ SubConnection registry (keyed by peer id)        │
//! │      └─ PeerTransport per peer, answers relayed      │
//! │         back as CONNECTION_ANSWER                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The core is written against the capability traits in [`transport`];
//! concrete implementations live in `exphub-webrtc` and `exphub-http`.
//!
//! # Example
//!
//! ```
//! use exphub_core::{ConnectionConfig, UserRole};
//!
//! let config = ConnectionConfig::participant(
//!     "https://hub.example.org/offer",
//!     "session-1",
//!     "participant-7",
//! );
//! assert_eq!(config.role, UserRole::Participant);
//! assert!(config.validate().is_ok());
//!
//! // Participants must name both their session and themselves
//! let mut incomplete = config.clone();
//! incomplete.participant_id = None;
//! assert!(incomplete.validate().is_err());
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod event_bus;
pub mod media;
pub mod messages;
pub mod transport;

pub use config::{ConnectionConfig, TurnServerConfig, UserRole};
pub use connection::{
    events, ConnectedPeer, ConnectionEvent, ConnectionState, MainConnection, SubConnection,
};
pub use error::{Error, Result};
pub use event_bus::{EventBus, HandlerId};
pub use media::{MediaTrack, RemoteStream, TrackHandle, TrackKind};
pub use messages::{
    message_types, ConnectionAnswer, ConnectionOffer, Message, NegotiationRequest,
    NegotiationResponse, ParticipantSummary, SessionDescription,
};
pub use transport::{
    ChannelEvent, IceConnectionState, IceGatheringState, MessageRelay, Negotiator, PeerTransport,
    ReliableChannel, SignalingState, TransportEvent, TransportFactory,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
