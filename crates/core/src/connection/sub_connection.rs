//! Peer connection created from a relayed `CONNECTION_OFFER`

use super::base::{Connection, ConnectedPeer, ConnectionCore, ConnectionEvent, LocalDescriptionKind};
use super::state::ConnectionState;
use crate::event_bus::EventBus;
use crate::media::RemoteStream;
use crate::messages::{
    message_types, ConnectionAnswer, ConnectionOffer, ParticipantSummary, SessionDescription,
};
use crate::transport::{MessageRelay, PeerTransport};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Connection to one remote peer, answered through the relay
pub struct SubConnection {
    core: ConnectionCore,
    id: String,
    offer: SessionDescription,
    participant_summary: Option<ParticipantSummary>,
    relay: Weak<dyn MessageRelay>,
    /// Set once the transport has been released
    released: AtomicBool,
}

impl std::fmt::Debug for SubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubConnection")
            .field("id", &self.id)
            .field("state", &self.core.state())
            .finish()
    }
}

impl SubConnection {
    /// Create a sub-connection seeded with `offer`, owning `transport`
    pub fn new(
        offer: ConnectionOffer,
        transport: Arc<dyn PeerTransport>,
        relay: Weak<dyn MessageRelay>,
        ice_gathering_timeout: Duration,
    ) -> Arc<Self> {
        let core = ConnectionCore::new(format!("sub:{}", offer.id), ice_gathering_timeout);
        core.set_transport(Arc::clone(&transport));

        Arc::new_cyclic(|weak_self: &Weak<SubConnection>| {
            let owner: Weak<dyn Connection> = weak_self.clone();
            core.bind_transport_events(&transport, owner);

            SubConnection {
                core,
                id: offer.id,
                offer: offer.offer,
                participant_summary: offer.participant_summary,
                relay,
                released: AtomicBool::new(false),
            }
        })
    }

    /// Remote peer id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    pub fn participant_summary(&self) -> Option<&ParticipantSummary> {
        self.participant_summary.as_ref()
    }

    pub fn remote_stream(&self) -> Arc<RemoteStream> {
        self.core.remote_stream()
    }

    /// Bus carrying `connectionStateChange`, `remoteStreamChange` and
    /// `connectionClosed`
    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        self.core.events()
    }

    /// Read-only view handed to consumers of the main connection
    pub fn connected_peer(&self) -> ConnectedPeer {
        ConnectedPeer {
            id: self.id.clone(),
            stream: self.core.remote_stream(),
            summary: self.participant_summary.clone(),
        }
    }

    /// Answer the seeded offer and relay the answer
    ///
    /// Fails only when not `New`; negotiation failures move the connection
    /// to `Failed` and release it.
    #[instrument(skip_all, fields(peer_id = %self.id))]
    pub async fn start(&self) -> Result<()> {
        if !self
            .core
            .transition_from(ConnectionState::New, ConnectionState::Connecting)
            .await
        {
            return Err(Error::state("start", self.core.state()));
        }

        if let Err(e) = self.negotiate().await {
            if self.core.transition(ConnectionState::Failed).await {
                warn!(error = %e, "sub-connection failed");
                self.release().await;
            } else {
                debug!(error = %e, "negotiation error after sub-connection ended");
            }
        }

        Ok(())
    }

    fn is_connecting(&self) -> bool {
        self.core.state() == ConnectionState::Connecting
    }

    async fn negotiate(&self) -> Result<()> {
        let transport = self
            .core
            .transport()
            .ok_or_else(|| Error::Transport(format!("sub:{} has no transport", self.id)))?;

        transport.set_remote_description(self.offer.clone()).await?;
        if !self.is_connecting() {
            return Ok(());
        }

        let answer = self
            .core
            .create_local_description(LocalDescriptionKind::Answer)
            .await?;
        if !self.is_connecting() {
            return Ok(());
        }

        let relay = self
            .relay
            .upgrade()
            .ok_or_else(|| Error::Transport("relay connection is gone".to_string()))?;
        let payload = serde_json::to_value(ConnectionAnswer {
            id: self.id.clone(),
            answer,
        })?;
        relay
            .send_message(message_types::CONNECTION_ANSWER, payload)
            .await?;

        if self
            .core
            .transition_from(ConnectionState::Connecting, ConnectionState::Connected)
            .await
        {
            info!(peer_id = %self.id, "sub-connection established");
        }
        Ok(())
    }

    /// Close the connection; `connectionClosed` is emitted exactly once
    pub async fn stop(&self) {
        if self.core.transition(ConnectionState::Closed).await {
            info!(peer_id = %self.id, "stopping sub-connection");
        }
        self.release().await;
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(transport) = self.core.transport() {
            if let Err(e) = transport.stop_transceivers().await {
                warn!(peer_id = %self.id, error = %e, "failed to stop transceivers");
            }
            if let Err(e) = transport.close().await {
                warn!(peer_id = %self.id, error = %e, "failed to close transport");
            }
        }

        self.core
            .emit(ConnectionEvent::ConnectionClosed(self.id.clone()))
            .await;

        // Nothing is emitted after this point; drop the registry watcher
        self.core.events().clear();
    }
}

#[async_trait]
impl Connection for SubConnection {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }

    async fn shutdown(&self) {
        self.stop().await;
    }

    async fn release_after_failure(&self) {
        self.release().await;
    }
}
