//! PeerTransport over an RTCPeerConnection

use crate::channel::WebRtcChannel;
use crate::forwarder::EventForwarder;
use crate::track::{WebRtcLocalTrack, WebRtcRemoteTrack};
use crate::Error;
use async_trait::async_trait;
use exphub_core::transport::TransportEventHandler;
use exphub_core::{
    IceConnectionState, IceGatheringState, PeerTransport, ReliableChannel, SessionDescription,
    SignalingState, TrackHandle, TransportEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use webrtc::api::API;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// One webrtc-rs peer connection
pub struct WebRtcTransport {
    /// Unique identifier used in logs
    connection_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    events: EventForwarder<TransportEvent>,
    gathering_rx: watch::Receiver<IceGatheringState>,
    /// RTP senders (retained to prevent track cleanup)
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl WebRtcTransport {
    /// Create a peer connection from `api` and wire its callbacks
    #[instrument(skip_all)]
    pub async fn new(api: &API, rtc_config: RTCConfiguration) -> crate::Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        let events = EventForwarder::new(format!("transport:{}", connection_id));
        let (gathering_tx, gathering_rx) = watch::channel(IceGatheringState::New);

        let id = connection_id.clone();
        peer_connection.on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
            let state = match s {
                RTCIceGathererState::Gathering => IceGatheringState::Gathering,
                RTCIceGathererState::Complete => IceGatheringState::Complete,
                _ => IceGatheringState::New,
            };
            debug!(connection_id = %id, state = ?state, "ICE gathering state");
            gathering_tx.send_replace(state);
            Box::pin(async {})
        }));

        let tx = events.sender();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |s: RTCIceConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Some(state) = map_ice_connection_state(s) {
                        let _ = tx.send(TransportEvent::IceConnectionStateChange(state));
                    }
                })
            },
        ));

        let tx = events.sender();
        peer_connection.on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Some(state) = map_signaling_state(s) {
                    let _ = tx.send(TransportEvent::SignalingStateChange(state));
                }
            })
        }));

        let tx = events.sender();
        let id = connection_id.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                let id = id.clone();
                Box::pin(async move {
                    let remote = WebRtcRemoteTrack::new(track);
                    info!(
                        connection_id = %id,
                        track_id = %exphub_core::MediaTrack::id(remote.as_ref()),
                        "remote track"
                    );
                    let _ = tx.send(TransportEvent::TrackReceived(remote));
                })
            },
        ));

        info!(connection_id = %connection_id, "peer connection created");

        Ok(Self {
            connection_id,
            peer_connection,
            events,
            gathering_rx,
            senders: Mutex::new(Vec::new()),
        })
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Get the underlying RTCPeerConnection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

fn map_ice_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    Some(match state {
        RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => return None,
    })
}

fn map_signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    Some(match state {
        RTCSignalingState::Stable => SignalingState::Stable,
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => return None,
    })
}

fn to_session_description(desc: RTCSessionDescription) -> SessionDescription {
    SessionDescription {
        sdp_type: desc.sdp_type.to_string(),
        sdp: desc.sdp,
    }
}

fn to_rtc_description(desc: SessionDescription) -> crate::Result<RTCSessionDescription> {
    let parsed = match desc.sdp_type.as_str() {
        "offer" => RTCSessionDescription::offer(desc.sdp),
        "answer" => RTCSessionDescription::answer(desc.sdp),
        "pranswer" => RTCSessionDescription::pranswer(desc.sdp),
        other => {
            return Err(Error::SdpError(format!(
                "Unsupported session description type '{}'",
                other
            )))
        }
    };
    parsed.map_err(|e| Error::SdpError(format!("Failed to parse {}: {}", desc.sdp_type, e)))
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> exphub_core::Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        debug!(connection_id = %self.connection_id, "created SDP offer");
        Ok(to_session_description(offer))
    }

    async fn create_answer(&self) -> exphub_core::Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        debug!(connection_id = %self.connection_id, "created SDP answer");
        Ok(to_session_description(answer))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> exphub_core::Result<()> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> exphub_core::Result<()> {
        let desc = to_rtc_description(desc)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        debug!(connection_id = %self.connection_id, "remote description set");
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .map(to_session_description)
    }

    async fn add_track(&self, track: TrackHandle) -> exphub_core::Result<()> {
        let Some(local) = track.as_any().downcast_ref::<WebRtcLocalTrack>() else {
            return Err(Error::MediaTrackError(format!(
                "Track {} was not created by this transport",
                track.id()
            ))
            .into());
        };

        let sender = self
            .peer_connection
            .add_track(local.inner() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add track: {}", e)))?;
        self.senders.lock().push(sender);

        debug!(connection_id = %self.connection_id, track_id = %track.id(), "local track added");
        Ok(())
    }

    fn ice_gathering_state(&self) -> watch::Receiver<IceGatheringState> {
        self.gathering_rx.clone()
    }

    fn on_event(&self, handler: TransportEventHandler) {
        self.events.set_handler(handler);
    }

    async fn create_channel(&self, label: &str) -> exphub_core::Result<Arc<dyn ReliableChannel>> {
        let channel = WebRtcChannel::new(&self.peer_connection, label).await?;
        Ok(Arc::new(channel))
    }

    async fn stop_transceivers(&self) -> exphub_core::Result<()> {
        for transceiver in self.peer_connection.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "failed to stop transceiver"
                );
            }
        }
        self.senders.lock().clear();
        Ok(())
    }

    async fn close(&self) -> exphub_core::Result<()> {
        info!(connection_id = %self.connection_id, "closing peer connection");
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))?;
        Ok(())
    }
}
