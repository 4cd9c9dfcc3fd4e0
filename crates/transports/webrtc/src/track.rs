//! Media track handles over webrtc-rs tracks

use crate::{Error, Result};
use exphub_core::{MediaTrack, TrackKind};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Local track fed with encoded samples by the application
///
/// Pass it to `MainConnection::start`; the transport attaches the inner
/// [`TrackLocalStaticSample`] to its peer connection.
pub struct WebRtcLocalTrack {
    id: String,
    kind: TrackKind,
    track: Arc<TrackLocalStaticSample>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for WebRtcLocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcLocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl WebRtcLocalTrack {
    /// Opus audio track (48 kHz, stereo)
    pub fn opus(stream_id: &str) -> Arc<Self> {
        let id = format!("audio-{}", uuid::Uuid::new_v4());
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            id.clone(),
            stream_id.to_string(),
        );
        Self::wrap(id, TrackKind::Audio, track)
    }

    /// VP8 video track (90 kHz clock)
    pub fn vp8(stream_id: &str) -> Arc<Self> {
        let id = format!("video-{}", uuid::Uuid::new_v4());
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            id.clone(),
            stream_id.to_string(),
        );
        Self::wrap(id, TrackKind::Video, track)
    }

    fn wrap(id: String, kind: TrackKind, track: TrackLocalStaticSample) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            track: Arc::new(track),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Write one encoded sample; dropped once the track is stopped
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        self.track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))
    }
}

impl MediaTrack for WebRtcLocalTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(track_id = %self.id, "local track stopped");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Track received from the remote peer
pub struct WebRtcRemoteTrack {
    id: String,
    kind: TrackKind,
    track: Arc<TrackRemote>,
}

impl std::fmt::Debug for WebRtcRemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcRemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl WebRtcRemoteTrack {
    pub fn new(track: Arc<TrackRemote>) -> Arc<Self> {
        let kind = match track.kind() {
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Audio,
        };
        Arc::new(Self {
            id: track.id(),
            kind,
            track,
        })
    }

    /// Underlying track, for reading RTP packets
    pub fn inner(&self) -> Arc<TrackRemote> {
        Arc::clone(&self.track)
    }
}

impl MediaTrack for WebRtcRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}
