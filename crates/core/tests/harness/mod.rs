//! In-memory transport doubles for connection tests
//!
//! `MockTransport`, `MockChannel` and `MockNegotiator` record every call
//! made by the connection core and let a test fire transport/channel events
//! by hand.

#![allow(dead_code)]

use async_trait::async_trait;
use exphub_core::transport::{ChannelEventHandler, TransportEventHandler};
use exphub_core::{
    message_types, ChannelEvent, ConnectionConfig, ConnectionEvent, Error, IceGatheringState,
    MainConnection, MediaTrack, NegotiationRequest, NegotiationResponse, Negotiator,
    PeerTransport, ReliableChannel, Result, SessionDescription, TrackHandle, TrackKind,
    TransportEvent, TransportFactory,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

pub const NEGOTIATION_URL: &str = "http://localhost:8080/offer";

/// Initialize tracing for tests (safe to call from every test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Transport
// =============================================================================

type SharedTransportHandler = Arc<dyn Fn(TransportEvent) -> BoxFuture<'static, ()> + Send + Sync>;
type SharedChannelHandler = Arc<dyn Fn(ChannelEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Recording [`PeerTransport`]
pub struct MockTransport {
    pub index: usize,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashSet<&'static str>>,
    auto_complete_gathering: bool,
    gathering_tx: watch::Sender<IceGatheringState>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    handler: Mutex<Option<SharedTransportHandler>>,
    channel: Mutex<Option<Arc<MockChannel>>>,
    channel_gate: Mutex<Option<Arc<Gate>>>,
}

/// Holds an operation until the test lets it through
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    open: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.reached.notify_one();
        self.open.notified().await;
    }
}

impl MockTransport {
    pub fn new(index: usize, auto_complete_gathering: bool) -> Arc<Self> {
        let (gathering_tx, _) = watch::channel(IceGatheringState::New);
        Arc::new(Self {
            index,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
            auto_complete_gathering,
            gathering_tx,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            handler: Mutex::new(None),
            channel: Mutex::new(None),
            channel_gate: Mutex::new(None),
        })
    }

    /// Make `operation` fail with a transport error
    pub fn fail_on(&self, operation: &'static str) {
        self.failures.lock().insert(operation);
    }

    fn record(&self, operation: &'static str, detail: Option<&str>) -> Result<()> {
        let entry = match detail {
            Some(detail) => format!("{}:{}", operation, detail),
            None => operation.to_string(),
        };
        self.calls.lock().push(entry);

        if self.failures.lock().contains(operation) {
            return Err(Error::Transport(format!("{} failed", operation)));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, operation: &str) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|c| c == operation || c.starts_with(&format!("{}:", operation)))
    }

    /// Position of the first call to `operation`
    pub fn call_index(&self, operation: &str) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|c| c == operation || c.starts_with(&format!("{}:", operation)))
    }

    pub fn complete_gathering(&self) {
        self.gathering_tx.send_replace(IceGatheringState::Complete);
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn channel(&self) -> Option<Arc<MockChannel>> {
        self.channel.lock().clone()
    }

    /// Deliver `event` to the installed handler, as the transport would
    pub async fn fire(&self, event: TransportEvent) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event).await;
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record("create_offer", None)?;
        Ok(SessionDescription::offer(format!("mock-offer-{}", self.index)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer", None)?;
        Ok(SessionDescription::answer(format!("mock-answer-{}", self.index)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record("set_local_description", Some(desc.sdp_type.as_str()))?;
        *self.local.lock() = Some(desc);
        self.gathering_tx.send_replace(IceGatheringState::Gathering);
        if self.auto_complete_gathering {
            self.complete_gathering();
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record("set_remote_description", Some(desc.sdp_type.as_str()))?;
        *self.remote.lock() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone().map(|mut desc| {
            desc.sdp.push_str("\r\na=candidate:mock");
            desc
        })
    }

    async fn add_track(&self, track: TrackHandle) -> Result<()> {
        self.record("add_track", Some(track.id().as_str()))
    }

    fn ice_gathering_state(&self) -> watch::Receiver<IceGatheringState> {
        self.gathering_tx.subscribe()
    }

    fn on_event(&self, handler: TransportEventHandler) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    async fn create_channel(&self, label: &str) -> Result<Arc<dyn ReliableChannel>> {
        self.record("create_channel", Some(label))?;
        let gate = self.channel_gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let channel = MockChannel::new(label);
        *self.channel.lock() = Some(Arc::clone(&channel));
        Ok(channel)
    }

    async fn stop_transceivers(&self) -> Result<()> {
        self.record("stop_transceivers", None)
    }

    async fn close(&self) -> Result<()> {
        self.record("close", None)
    }
}

// =============================================================================
// Reliable channel
// =============================================================================

/// Recording [`ReliableChannel`]
pub struct MockChannel {
    label: String,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    handler: Mutex<Option<SharedChannelHandler>>,
}

impl MockChannel {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            handler: Mutex::new(None),
        })
    }

    /// Every frame written so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Written frames parsed back into JSON
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn fire(&self, event: ChannelEvent) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event).await;
        }
    }

    pub async fn open(&self) {
        self.fire(ChannelEvent::Open).await;
    }

    /// Deliver one inbound frame
    pub async fn receive(&self, text: impl Into<String>) {
        self.fire(ChannelEvent::Message(text.into())).await;
    }
}

#[async_trait]
impl ReliableChannel for MockChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn on_event(&self, handler: ChannelEventHandler) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    async fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("channel closed".to_string()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Hands out [`MockTransport`]s and keeps them for inspection
pub struct MockFactory {
    auto_complete_gathering: bool,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    fail: AtomicBool,
    channel_gate: Option<Arc<Gate>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Self::with_gathering(true)
    }

    /// Transports whose ICE gathering only completes on demand
    pub fn manual_gathering() -> Arc<Self> {
        Self::with_gathering(false)
    }

    /// Transports whose `create_channel` waits for
    /// [`release_channel`](Self::release_channel)
    pub fn gated_channels() -> Arc<Self> {
        Arc::new(Self {
            channel_gate: Some(Arc::new(Gate::default())),
            ..Self::build(true)
        })
    }

    fn with_gathering(auto_complete_gathering: bool) -> Arc<Self> {
        Arc::new(Self::build(auto_complete_gathering))
    }

    fn build(auto_complete_gathering: bool) -> Self {
        Self {
            auto_complete_gathering,
            transports: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            channel_gate: None,
        }
    }

    /// Wait until a transport is inside `create_channel`
    pub async fn channel_requested(&self) {
        if let Some(gate) = &self.channel_gate {
            gate.reached.notified().await;
        }
    }

    pub fn release_channel(&self) {
        if let Some(gate) = &self.channel_gate {
            gate.open.notify_one();
        }
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    /// Transport number `index`, in creation order (0 is the relay)
    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.transports.lock()[index])
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create_transport(&self) -> Result<Arc<dyn PeerTransport>> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(Error::Transport("no transport available".to_string()));
        }
        let mut transports = self.transports.lock();
        let transport = MockTransport::new(transports.len(), self.auto_complete_gathering);
        *transport.channel_gate.lock() = self.channel_gate.clone();
        transports.push(Arc::clone(&transport));
        Ok(transport)
    }
}

// =============================================================================
// Negotiator
// =============================================================================

/// Scripted [`Negotiator`]
pub struct MockNegotiator {
    response: Mutex<Result<NegotiationResponse>>,
    requests: Mutex<Vec<NegotiationRequest>>,
    gate: Option<Notify>,
    received: Notify,
}

impl MockNegotiator {
    fn with(response: Result<NegotiationResponse>, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            requests: Mutex::new(Vec::new()),
            gate: gated.then(Notify::new),
            received: Notify::new(),
        })
    }

    /// Answers with a `SESSION_DESCRIPTION` carrying a participant summary
    pub fn answering() -> Arc<Self> {
        Self::with(Ok(session_description_response()), false)
    }

    pub fn responding(response: NegotiationResponse) -> Arc<Self> {
        Self::with(Ok(response), false)
    }

    pub fn failing() -> Arc<Self> {
        Self::with(
            Err(Error::Negotiation("endpoint unreachable".to_string())),
            false,
        )
    }

    /// Answers only after [`release`](Self::release)
    pub fn gated() -> Arc<Self> {
        Self::with(Ok(session_description_response()), true)
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Wait until a request has arrived
    pub async fn request_received(&self) {
        if !self.requests.lock().is_empty() {
            return;
        }
        self.received.notified().await;
    }

    pub fn requests(&self) -> Vec<NegotiationRequest> {
        self.requests.lock().clone()
    }
}

fn session_description_response() -> NegotiationResponse {
    NegotiationResponse {
        msg_type: message_types::SESSION_DESCRIPTION.to_string(),
        data: json!({
            "sdp": "mock-answer-relay",
            "type": "answer",
            "participant_summary": {"name": "relay"}
        }),
    }
}

#[async_trait]
impl Negotiator for MockNegotiator {
    async fn negotiate(&self, request: NegotiationRequest) -> Result<NegotiationResponse> {
        self.requests.lock().push(request);
        self.received.notify_one();

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &*self.response.lock() {
            Ok(response) => Ok(response.clone()),
            Err(e) => Err(Error::Negotiation(e.to_string())),
        }
    }
}

// =============================================================================
// Media
// =============================================================================

#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: TrackKind,
    stopped: AtomicBool,
}

impl MockTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Event recording
// =============================================================================

/// Collects every event of the given names published on a bus
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ConnectionEvent>>>,
}

impl EventLog {
    pub fn attach(bus: &exphub_core::EventBus<ConnectionEvent>, names: &[&str]) -> Self {
        let log = Self::default();
        for name in names {
            let events = Arc::clone(&log.events);
            bus.on(name, move |event| {
                let events = Arc::clone(&events);
                async move {
                    events.lock().push(event);
                }
            });
        }
        log
    }

    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().clone()
    }

    pub fn states(&self) -> Vec<exphub_core::ConnectionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::StateChange(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Peer ids of every `connectedPeersChange` snapshot
    pub fn peer_snapshots(&self) -> Vec<Vec<String>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::ConnectedPeersChange(peers) => {
                    Some(peers.iter().map(|p| p.id.clone()).collect())
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }
}

/// Counts `api` emissions for one message type
pub fn count_api(main: &MainConnection, msg_type: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    main.api().on(msg_type, move |_data: Value| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });
    count
}

// =============================================================================
// Setup helpers
// =============================================================================

pub fn experimenter_config() -> ConnectionConfig {
    ConnectionConfig::experimenter(NEGOTIATION_URL)
}

pub struct Setup {
    pub main: Arc<MainConnection>,
    pub factory: Arc<MockFactory>,
    pub negotiator: Arc<MockNegotiator>,
}

impl Setup {
    pub fn new(
        config: ConnectionConfig,
        factory: Arc<MockFactory>,
        negotiator: Arc<MockNegotiator>,
    ) -> Self {
        let main = MainConnection::new(config, factory.clone(), negotiator.clone())
            .expect("valid config");
        Self {
            main,
            factory,
            negotiator,
        }
    }

    pub fn experimenter() -> Self {
        Self::new(experimenter_config(), MockFactory::new(), MockNegotiator::answering())
    }

    pub fn relay(&self) -> Arc<MockTransport> {
        self.factory.transport(0)
    }

    pub fn relay_channel(&self) -> Arc<MockChannel> {
        self.relay().channel().expect("relay channel created")
    }

    /// Start and open the relay channel
    pub async fn connect(&self) {
        self.main.start(Vec::new()).await.expect("start from New");
        self.relay_channel().open().await;
        assert_eq!(self.main.state(), exphub_core::ConnectionState::Connected);
    }

    /// Deliver a `CONNECTION_OFFER` for `id` over the relay channel
    pub async fn offer(&self, id: &str) {
        let frame = json!({
            "type": message_types::CONNECTION_OFFER,
            "data": {
                "id": id,
                "offer": {"sdp": format!("remote-offer-{}", id), "type": "offer"},
                "participant_summary": {"name": id}
            }
        });
        self.main.handle_raw_message(&frame.to_string()).await;
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
