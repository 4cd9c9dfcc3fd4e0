//! TransportFactory building webrtc-rs peer connections from a ConnectionConfig

use crate::transport::WebRtcTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use exphub_core::{ConnectionConfig, PeerTransport, TransportFactory};
use std::sync::Arc;
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Creates one [`WebRtcTransport`] per connection
pub struct WebRtcTransportFactory {
    api: API,
    rtc_config: RTCConfiguration,
}

impl WebRtcTransportFactory {
    /// Build the webrtc-rs API (default codecs and interceptors) and ICE
    /// server list from `config`
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.stun_servers.is_empty() && config.turn_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN or TURN server is required".to_string(),
            ));
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        debug!(
            ice_servers = rtc_config.ice_servers.len(),
            "webrtc transport factory ready"
        );

        Ok(Self { api, rtc_config })
    }
}

fn ice_servers(config: &ConnectionConfig) -> Vec<RTCIceServer> {
    config
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(config.turn_servers.iter().map(|turn| {
            #[allow(clippy::needless_update)]
            RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }
        }))
        .collect()
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create_transport(&self) -> exphub_core::Result<Arc<dyn PeerTransport>> {
        let transport = WebRtcTransport::new(&self.api, self.rtc_config.clone()).await?;
        Ok(Arc::new(transport))
    }
}
