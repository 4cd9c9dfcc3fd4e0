//! Relay connection of a hub client
//!
//! A [`MainConnection`] negotiates one transport with the negotiation
//! endpoint, owns the reliable message channel, dispatches inbound messages
//! on its [`api`](MainConnection::api) bus and keeps the registry of
//! [`SubConnection`]s created from relayed `CONNECTION_OFFER`s.

use super::base::{
    Connection, ConnectedPeer, ConnectionCore, ConnectionEvent, LocalDescriptionKind,
};
use super::events;
use super::state::ConnectionState;
use super::sub_connection::SubConnection;
use crate::config::ConnectionConfig;
use crate::event_bus::EventBus;
use crate::media::{RemoteStream, TrackHandle};
use crate::messages::{
    message_types, ConnectionOffer, Message, NegotiationRequest, ParticipantSummary,
};
use crate::transport::{
    ChannelEvent, MessageRelay, Negotiator, PeerTransport, ReliableChannel, TransportFactory,
};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Connection to the hub relay
pub struct MainConnection {
    core: ConnectionCore,
    config: ConnectionConfig,
    transports: Arc<dyn TransportFactory>,
    negotiator: Arc<dyn Negotiator>,
    api: EventBus<Value>,
    channel: RwLock<Option<Arc<dyn ReliableChannel>>>,
    local_tracks: Mutex<Vec<TrackHandle>>,
    sub_connections: RwLock<BTreeMap<String, Arc<SubConnection>>>,
    participant_summary: RwLock<Option<ParticipantSummary>>,
    /// Set once sub-connections, channel and transport have been released
    released: AtomicBool,
    weak_self: Weak<MainConnection>,
}

impl std::fmt::Debug for MainConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainConnection")
            .field("role", &self.config.role)
            .field("state", &self.core.state())
            .field("sub_connections", &self.sub_connection_ids())
            .finish()
    }
}

impl MainConnection {
    /// Create a connection in state `New`
    ///
    /// The configuration is validated before anything else; no transport is
    /// requested from `transports` until [`start`](Self::start).
    pub fn new(
        config: ConnectionConfig,
        transports: Arc<dyn TransportFactory>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let connection = Arc::new_cyclic(|weak_self: &Weak<MainConnection>| {
            let api = EventBus::with_options("api", config.warn_unhandled_messages);

            let weak = weak_self.clone();
            api.on(message_types::CONNECTION_OFFER, move |data: Value| {
                let weak = weak.clone();
                async move {
                    if let Some(main) = weak.upgrade() {
                        main.handle_connection_offer(data).await;
                    }
                }
            });

            MainConnection {
                core: ConnectionCore::new("main", config.ice_gathering_timeout()),
                config,
                transports,
                negotiator,
                api,
                channel: RwLock::new(None),
                local_tracks: Mutex::new(Vec::new()),
                sub_connections: RwLock::new(BTreeMap::new()),
                participant_summary: RwLock::new(None),
                released: AtomicBool::new(false),
                weak_self: weak_self.clone(),
            }
        });

        debug!(role = %connection.config.role, "main connection created");
        Ok(connection)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    /// Bus carrying `connectionStateChange`, `remoteStreamChange` and
    /// `connectedPeersChange`
    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        self.core.events()
    }

    /// Bus receiving every inbound message, keyed by message type
    pub fn api(&self) -> &EventBus<Value> {
        &self.api
    }

    /// Media received from the relay itself
    pub fn remote_stream(&self) -> Arc<RemoteStream> {
        self.core.remote_stream()
    }

    /// Summary returned by the negotiation endpoint, once connected
    pub fn participant_summary(&self) -> Option<ParticipantSummary> {
        self.participant_summary.read().clone()
    }

    /// Snapshot of the peers currently in the registry
    pub fn connected_peers(&self) -> Vec<ConnectedPeer> {
        self.sub_connections
            .read()
            .values()
            .map(|sub| sub.connected_peer())
            .collect()
    }

    pub fn sub_connection(&self, id: &str) -> Option<Arc<SubConnection>> {
        self.sub_connections.read().get(id).cloned()
    }

    pub fn sub_connection_ids(&self) -> Vec<String> {
        self.sub_connections.read().keys().cloned().collect()
    }

    /// Negotiate with the hub
    ///
    /// Fails only when the connection is not `New`. Anything that goes wrong
    /// afterwards moves the connection to `Failed` and is reported through
    /// `connectionStateChange`.
    #[instrument(skip_all, fields(role = %self.config.role))]
    pub async fn start(&self, local_tracks: Vec<TrackHandle>) -> Result<()> {
        if !self
            .core
            .transition_from(ConnectionState::New, ConnectionState::Connecting)
            .await
        {
            return Err(Error::state("start", self.core.state()));
        }

        info!(tracks = local_tracks.len(), "starting main connection");
        *self.local_tracks.lock() = local_tracks.clone();

        if let Err(e) = self.negotiate(local_tracks).await {
            if self.core.transition(ConnectionState::Failed).await {
                warn!(error = %e, "main connection failed");
                self.release(true).await;
            } else {
                debug!(error = %e, "negotiation error after connection ended");
            }
        }

        Ok(())
    }

    fn is_connecting(&self) -> bool {
        self.core.state() == ConnectionState::Connecting
    }

    async fn negotiate(&self, local_tracks: Vec<TrackHandle>) -> Result<()> {
        let transport = self.transports.create_transport().await?;
        self.core.set_transport(Arc::clone(&transport));

        if !self.is_connecting() {
            debug!("stopped while creating transport");
            close_quietly(transport.as_ref()).await;
            return Ok(());
        }

        let owner: Weak<dyn Connection> = self.weak_self.clone();
        self.core.bind_transport_events(&transport, owner);

        let channel = transport
            .create_channel(&self.config.data_channel_label)
            .await?;
        self.bind_channel_events(channel.as_ref());
        *self.channel.write() = Some(channel);

        // Whoever takes the channel out of the slot closes it
        if !self.is_connecting() {
            debug!("stopped while opening the reliable channel");
            let channel = self.channel.write().take();
            if let Some(channel) = channel {
                close_channel_quietly(channel.as_ref()).await;
            }
            return Ok(());
        }

        for track in local_tracks {
            debug!(track_id = %track.id(), kind = %track.kind(), "adding local track");
            transport.add_track(track).await?;
        }

        let offer = self
            .core
            .create_local_description(LocalDescriptionKind::Offer)
            .await?;
        if !self.is_connecting() {
            return Ok(());
        }

        let request = NegotiationRequest::new(
            &offer,
            self.config.role,
            self.config.session_id.clone(),
            self.config.participant_id.clone(),
        );
        let response = self.negotiator.negotiate(request).await?;
        if !self.is_connecting() {
            debug!("negotiation answer arrived after connection ended");
            return Ok(());
        }

        if !response.is_session_description() {
            warn!(
                response_type = %response.msg_type,
                "unexpected negotiation answer, staying in connecting"
            );
            return Ok(());
        }

        let answer = response.into_answer()?;
        *self.participant_summary.write() = answer.participant_summary.clone();
        transport.set_remote_description(answer.description()).await?;

        debug!("remote description applied, waiting for channel");
        Ok(())
    }

    fn bind_channel_events(&self, channel: &dyn ReliableChannel) {
        let weak = self.weak_self.clone();
        channel.on_event(Box::new(move |event| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(main) = weak.upgrade() else {
                    return;
                };
                match event {
                    ChannelEvent::Open => {
                        let opened = main
                            .core
                            .transition_from(
                                ConnectionState::Connecting,
                                ConnectionState::Connected,
                            )
                            .await;
                        if opened {
                            info!("main connection established");
                        }
                    }
                    ChannelEvent::Message(text) => main.handle_raw_message(&text).await,
                    ChannelEvent::Close => {
                        info!("reliable channel closed");
                        main.stop(true).await;
                    }
                }
            })
        }));
    }

    /// Tear the connection down
    ///
    /// No-op when already `Closed` or `Failed`. Sub-connections are stopped
    /// first; `close_senders` also stops the tracks passed to `start`.
    pub async fn stop(&self, close_senders: bool) {
        if !self.core.transition(ConnectionState::Closed).await {
            debug!(state = %self.core.state(), "stop ignored");
            return;
        }
        info!(close_senders, "stopping main connection");
        self.release(close_senders).await;
    }

    /// Release sub-connections, channel, transceivers and transport
    ///
    /// Runs once, after the move to `Closed` or `Failed`.
    async fn release(&self, close_senders: bool) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let subs: Vec<Arc<SubConnection>> = std::mem::take(&mut *self.sub_connections.write())
            .into_values()
            .collect();
        let had_peers = !subs.is_empty();
        for sub in subs {
            sub.stop().await;
        }
        if had_peers {
            self.emit_connected_peers().await;
        }

        let channel = self.channel.write().take();
        if let Some(channel) = channel {
            close_channel_quietly(channel.as_ref()).await;
        }

        let transport = self.core.transport();
        if let Some(transport) = &transport {
            if let Err(e) = transport.stop_transceivers().await {
                warn!(error = %e, "failed to stop transceivers");
            }
        }

        if close_senders {
            let tracks = std::mem::take(&mut *self.local_tracks.lock());
            for track in tracks {
                track.stop();
            }
        }

        if let Some(transport) = transport {
            close_quietly(transport.as_ref()).await;
        }
    }

    /// Send `{type, data}` over the reliable channel
    pub async fn send_message(&self, msg_type: &str, data: Value) -> Result<()> {
        let state = self.core.state();
        if state != ConnectionState::Connected {
            return Err(Error::state("send a message", state));
        }

        let channel = self
            .channel
            .read()
            .clone()
            .ok_or_else(|| Error::state("send a message", state))?;

        let text = Message::new(msg_type, data).to_json()?;
        debug!(msg_type, "sending message");
        channel.send_text(text).await
    }

    /// Parse one inbound channel payload and dispatch it on [`api`](Self::api)
    ///
    /// Malformed payloads are logged and dropped.
    pub async fn handle_raw_message(&self, text: &str) {
        match Message::parse(text) {
            Ok(message) => {
                debug!(msg_type = %message.msg_type, "message received");
                self.api.emit(&message.msg_type, message.data).await;
            }
            Err(e) => warn!(error = %e, "dropping inbound message"),
        }
    }

    async fn handle_connection_offer(&self, data: Value) {
        let offer = match ConnectionOffer::from_value(data) {
            Ok(offer) => offer,
            Err(e) => {
                warn!(error = %e, "dropping connection offer");
                return;
            }
        };

        if self.core.state().is_terminal() {
            warn!(peer_id = %offer.id, "dropping connection offer, main connection has ended");
            return;
        }

        let transport = match self.transports.create_transport().await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(peer_id = %offer.id, error = %e, "cannot create sub-connection transport");
                return;
            }
        };

        let relay: Weak<dyn MessageRelay> = self.weak_self.clone();
        let sub = SubConnection::new(offer, transport, relay, self.config.ice_gathering_timeout());
        self.watch_sub_connection(&sub);

        let replaced = self
            .sub_connections
            .write()
            .insert(sub.id().to_string(), Arc::clone(&sub));

        if self.core.state().is_terminal() {
            self.remove_sub_connection(sub.id(), &Arc::downgrade(&sub));
            sub.stop().await;
            return;
        }

        if let Some(old) = replaced {
            info!(peer_id = %sub.id(), "replacing existing sub-connection");
            old.stop().await;
        }

        info!(peer_id = %sub.id(), "sub-connection registered");
        self.emit_connected_peers().await;

        tokio::spawn(async move {
            if let Err(e) = sub.start().await {
                warn!(peer_id = %sub.id(), error = %e, "sub-connection did not start");
            }
        });
    }

    fn watch_sub_connection(&self, sub: &Arc<SubConnection>) {
        let main = self.weak_self.clone();
        sub.core()
            .events()
            .on(events::REMOTE_STREAM_CHANGE, move |_event: ConnectionEvent| {
                let main = main.clone();
                async move {
                    if let Some(main) = main.upgrade() {
                        main.emit_connected_peers().await;
                    }
                }
            });

        let main = self.weak_self.clone();
        let watched = Arc::downgrade(sub);
        sub.core()
            .events()
            .on(events::CONNECTION_CLOSED, move |event: ConnectionEvent| {
                let main = main.clone();
                let watched = watched.clone();
                async move {
                    let ConnectionEvent::ConnectionClosed(id) = event else {
                        return;
                    };
                    let Some(main) = main.upgrade() else {
                        return;
                    };
                    if main.remove_sub_connection(&id, &watched) {
                        debug!(peer_id = %id, "sub-connection removed");
                        main.emit_connected_peers().await;
                    }
                }
            });
    }

    /// Remove `id` only if it still maps to `sub`
    fn remove_sub_connection(&self, id: &str, sub: &Weak<SubConnection>) -> bool {
        let mut subs = self.sub_connections.write();
        match subs.get(id) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), sub.as_ptr()) => {
                subs.remove(id);
                true
            }
            _ => false,
        }
    }

    async fn emit_connected_peers(&self) {
        let peers = self.connected_peers();
        self.core
            .emit(ConnectionEvent::ConnectedPeersChange(peers))
            .await;
    }
}

async fn close_channel_quietly(channel: &dyn ReliableChannel) {
    if let Err(e) = channel.close().await {
        warn!(error = %e, "failed to close reliable channel");
    }
}

async fn close_quietly(transport: &dyn PeerTransport) {
    if let Err(e) = transport.close().await {
        warn!(error = %e, "failed to close transport");
    }
}

#[async_trait]
impl Connection for MainConnection {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }

    async fn shutdown(&self) {
        self.stop(true).await;
    }

    async fn release_after_failure(&self) {
        self.release(true).await;
    }
}

#[async_trait]
impl MessageRelay for MainConnection {
    async fn send_message(&self, msg_type: &str, data: Value) -> Result<()> {
        MainConnection::send_message(self, msg_type, data).await
    }
}
