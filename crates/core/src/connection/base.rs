//! Behavior shared by main and sub-connections
//!
//! [`ConnectionCore`] owns the state, the transport primitive, the remote
//! stream and the per-connection event bus. The owning connection type
//! implements [`Connection`] so transport signals can call back into it.

use super::events;
use super::state::ConnectionState;
use crate::event_bus::EventBus;
use crate::media::RemoteStream;
use crate::messages::{ParticipantSummary, SessionDescription};
use crate::transport::{
    IceConnectionState, IceGatheringState, PeerTransport, SignalingState, TransportEvent,
};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Events emitted on a connection's own bus
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// New lifecycle state
    StateChange(ConnectionState),
    /// The remote stream gained a track; the handle is the stable stream
    RemoteStreamChange(Arc<RemoteStream>),
    /// Fresh snapshot of the peers known to a main connection
    ConnectedPeersChange(Vec<ConnectedPeer>),
    /// A sub-connection with this id has been stopped
    ConnectionClosed(String),
}

impl ConnectionEvent {
    /// Event name the variant is published under
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange(_) => events::CONNECTION_STATE_CHANGE,
            Self::RemoteStreamChange(_) => events::REMOTE_STREAM_CHANGE,
            Self::ConnectedPeersChange(_) => events::CONNECTED_PEERS_CHANGE,
            Self::ConnectionClosed(_) => events::CONNECTION_CLOSED,
        }
    }
}

/// Read-only view of one sub-connection
#[derive(Debug, Clone)]
pub struct ConnectedPeer {
    /// Remote peer id
    pub id: String,
    /// Accumulated remote media
    pub stream: Arc<RemoteStream>,
    /// Last-known summary of the remote peer
    pub summary: Option<ParticipantSummary>,
}

/// Which local description to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDescriptionKind {
    Offer,
    Answer,
}

/// Hooks a connection type exposes to its [`ConnectionCore`]
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    fn core(&self) -> &ConnectionCore;

    /// Graceful stop requested by the transport (disconnected/closed)
    async fn shutdown(&self);

    /// Called once after an ICE failure moved the connection to `Failed`
    async fn release_after_failure(&self) {}
}

/// State machine + transport wrapper
pub struct ConnectionCore {
    /// Name used in logs ("main", "sub:<id>")
    label: String,
    state: Mutex<ConnectionState>,
    transport: RwLock<Option<Arc<dyn PeerTransport>>>,
    remote_stream: Arc<RemoteStream>,
    events: EventBus<ConnectionEvent>,
    ice_gathering_timeout: Duration,
}

impl std::fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("label", &self.label)
            .field("state", &*self.state.lock())
            .field("remote_tracks", &self.remote_stream.len())
            .finish()
    }
}

impl ConnectionCore {
    pub fn new(label: impl Into<String>, ice_gathering_timeout: Duration) -> Self {
        let label = label.into();
        Self {
            events: EventBus::new(format!("{}-events", label)),
            label,
            state: Mutex::new(ConnectionState::New),
            transport: RwLock::new(None),
            remote_stream: Arc::new(RemoteStream::new()),
            ice_gathering_timeout,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        &self.events
    }

    /// Stable handle to the remote stream
    pub fn remote_stream(&self) -> Arc<RemoteStream> {
        Arc::clone(&self.remote_stream)
    }

    pub fn transport(&self) -> Option<Arc<dyn PeerTransport>> {
        self.transport.read().clone()
    }

    pub(crate) fn set_transport(&self, transport: Arc<dyn PeerTransport>) {
        *self.transport.write() = Some(transport);
    }

    fn require_transport(&self) -> Result<Arc<dyn PeerTransport>> {
        self.transport()
            .ok_or_else(|| Error::Transport(format!("{} has no transport", self.label)))
    }

    /// Apply `next` if it is an edge from the current state
    ///
    /// Emits `connectionStateChange` on success. Rejected transitions are
    /// no-ops and return `false`.
    pub async fn transition(&self, next: ConnectionState) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if !state.can_transition_to(next) {
                debug!(
                    connection = %self.label,
                    from = %*state,
                    to = %next,
                    "state transition rejected"
                );
                return false;
            }
            std::mem::replace(&mut *state, next)
        };

        debug!(connection = %self.label, from = %previous, to = %next, "state transition");
        self.emit(ConnectionEvent::StateChange(next)).await;
        true
    }

    /// Apply `next` only if the current state is `expected`
    pub async fn transition_from(&self, expected: ConnectionState, next: ConnectionState) -> bool {
        {
            let state = self.state.lock();
            if *state != expected {
                debug!(
                    connection = %self.label,
                    state = %*state,
                    expected = %expected,
                    "stale continuation ignored"
                );
                return false;
            }
        }
        self.transition(next).await
    }

    /// Publish `event` under its own name
    pub async fn emit(&self, event: ConnectionEvent) -> usize {
        self.events.emit(event.name(), event).await
    }

    /// Create, apply and finalize a local description
    ///
    /// Resolves once ICE gathering is complete so the returned description
    /// carries every candidate.
    pub async fn create_local_description(
        &self,
        kind: LocalDescriptionKind,
    ) -> Result<SessionDescription> {
        let transport = self.require_transport()?;

        let description = match kind {
            LocalDescriptionKind::Offer => transport.create_offer().await?,
            LocalDescriptionKind::Answer => transport.create_answer().await?,
        };
        transport.set_local_description(description).await?;

        self.wait_for_ice_gathering(transport.as_ref()).await?;

        transport.local_description().await.ok_or_else(|| {
            Error::Transport(format!(
                "{}: no local description after ICE gathering",
                self.label
            ))
        })
    }

    async fn wait_for_ice_gathering(&self, transport: &dyn PeerTransport) -> Result<()> {
        let mut gathering = transport.ice_gathering_state();

        let completed = tokio::time::timeout(
            self.ice_gathering_timeout,
            gathering.wait_for(|s| *s == IceGatheringState::Complete),
        )
        .await
        .map(|waited| waited.is_ok());

        match completed {
            Ok(true) => {
                debug!(connection = %self.label, "ICE gathering complete");
                Ok(())
            }
            Ok(false) => Err(Error::Transport(format!(
                "{}: transport dropped before ICE gathering completed",
                self.label
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "{}: ICE gathering did not complete within {:?}",
                self.label, self.ice_gathering_timeout
            ))),
        }
    }

    /// Route `transport` events to this core, calling back into `owner`
    pub fn bind_transport_events(
        &self,
        transport: &Arc<dyn PeerTransport>,
        owner: Weak<dyn Connection>,
    ) {
        transport.on_event(Box::new(move |event| {
            let owner = owner.clone();
            Box::pin(async move {
                if let Some(owner) = owner.upgrade() {
                    handle_transport_event(owner.as_ref(), event).await;
                }
            })
        }));
    }
}

async fn handle_transport_event(owner: &dyn Connection, event: TransportEvent) {
    let core = owner.core();

    match event {
        TransportEvent::TrackReceived(track) => {
            debug!(
                connection = %core.label,
                track_id = %track.id(),
                kind = %track.kind(),
                "remote track received"
            );
            core.remote_stream.add_track(track);
            core.emit(ConnectionEvent::RemoteStreamChange(core.remote_stream()))
                .await;
        }
        TransportEvent::IceConnectionStateChange(IceConnectionState::Failed) => {
            if core.transition(ConnectionState::Failed).await {
                warn!(connection = %core.label, "ICE connection failed");
                owner.release_after_failure().await;
            }
        }
        TransportEvent::IceConnectionStateChange(
            ice @ (IceConnectionState::Disconnected | IceConnectionState::Closed),
        ) => {
            info!(connection = %core.label, ice = ?ice, "ICE connection ended, stopping");
            owner.shutdown().await;
        }
        TransportEvent::SignalingStateChange(SignalingState::Closed) => {
            info!(connection = %core.label, "signaling closed, stopping");
            owner.shutdown().await;
        }
        other => {
            debug!(connection = %core.label, event = ?other, "transport event");
        }
    }
}
