//! Capability traits the connection core is built against
//!
//! The core never names a concrete peer-connection or HTTP library. A
//! transport crate implements [`PeerTransport`], [`ReliableChannel`] and
//! [`TransportFactory`]; a negotiation crate implements [`Negotiator`].

use crate::media::TrackHandle;
use crate::messages::{NegotiationRequest, NegotiationResponse, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// ICE candidate gathering progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// ICE connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Signaling state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Asynchronous notifications raised by a [`PeerTransport`]
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Remote peer added a media track
    TrackReceived(TrackHandle),
    IceConnectionStateChange(IceConnectionState),
    SignalingStateChange(SignalingState),
}

/// Notifications raised by a [`ReliableChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    /// One text frame, in arrival order
    Message(String),
    Close,
}

/// Callback receiving transport events
pub type TransportEventHandler =
    Box<dyn Fn(TransportEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback receiving channel events
pub type ChannelEventHandler = Box<dyn Fn(ChannelEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Peer-to-peer connection primitive (offer/answer, tracks, ICE)
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Attach a local track for sending
    async fn add_track(&self, track: TrackHandle) -> Result<()>;

    /// Observable ICE gathering state
    fn ice_gathering_state(&self) -> watch::Receiver<IceGatheringState>;

    /// Install the event handler; replaces any previous one
    fn on_event(&self, handler: TransportEventHandler);

    /// Open the ordered, reliable message channel
    async fn create_channel(&self, label: &str) -> Result<Arc<dyn ReliableChannel>>;

    /// Stop every RTP transceiver
    async fn stop_transceivers(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Ordered, reliable, bidirectional text channel
#[async_trait]
pub trait ReliableChannel: Send + Sync {
    fn label(&self) -> String;

    /// Install the event handler; replaces any previous one
    fn on_event(&self, handler: ChannelEventHandler);

    async fn send_text(&self, text: String) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates one transport per connection
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_transport(&self) -> Result<Arc<dyn PeerTransport>>;
}

/// Request/response exchange with the negotiation endpoint
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self, request: NegotiationRequest) -> Result<NegotiationResponse>;
}

/// Outbound message path a sub-connection uses to relay its negotiation
#[async_trait]
pub trait MessageRelay: Send + Sync {
    async fn send_message(&self, msg_type: &str, data: Value) -> Result<()>;
}
