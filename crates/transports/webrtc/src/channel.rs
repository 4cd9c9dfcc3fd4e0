//! Reliable message channel over an RTCDataChannel

use crate::forwarder::EventForwarder;
use crate::Error;
use async_trait::async_trait;
use exphub_core::transport::ChannelEventHandler;
use exphub_core::{ChannelEvent, ReliableChannel};
use std::sync::Arc;
use tracing::{debug, error, warn};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

/// Ordered, reliable text channel
pub struct WebRtcChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
    events: EventForwarder<ChannelEvent>,
}

impl WebRtcChannel {
    /// Create an ordered channel with unlimited retransmits on `peer_connection`
    pub async fn new(peer_connection: &RTCPeerConnection, label: &str) -> crate::Result<Self> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let rtc_channel = peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to create data channel: {}", e)))?;

        Ok(Self::from_rtc_channel(rtc_channel))
    }

    /// Wrap an existing RTCDataChannel
    pub fn from_rtc_channel(rtc_channel: Arc<RTCDataChannel>) -> Self {
        let label = rtc_channel.label().to_string();
        let events = EventForwarder::new(format!("channel:{}", label));

        let tx = events.sender();
        let open_label = label.clone();
        rtc_channel.on_open(Box::new(move || {
            Box::pin(async move {
                debug!(channel = %open_label, "data channel opened");
                let _ = tx.send(ChannelEvent::Open);
            })
        }));

        let tx = events.sender();
        let close_label = label.clone();
        rtc_channel.on_close(Box::new(move || {
            let tx = tx.clone();
            let label = close_label.clone();
            Box::pin(async move {
                debug!(channel = %label, "data channel closed");
                let _ = tx.send(ChannelEvent::Close);
            })
        }));

        let tx = events.sender();
        let message_label = label.clone();
        rtc_channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = tx.clone();
            let label = message_label.clone();
            Box::pin(async move {
                if !msg.is_string {
                    warn!(channel = %label, bytes = msg.data.len(), "dropping binary frame");
                    return;
                }
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = tx.send(ChannelEvent::Message(text));
                    }
                    Err(e) => warn!(channel = %label, error = %e, "dropping non UTF-8 frame"),
                }
            })
        }));

        let error_label = label.clone();
        rtc_channel.on_error(Box::new(move |err: webrtc::Error| {
            let label = error_label.clone();
            Box::pin(async move {
                error!(channel = %label, error = %err, "data channel error");
            })
        }));

        Self {
            label,
            rtc_channel,
            events,
        }
    }

    /// Get the underlying RTCDataChannel
    pub fn rtc_channel(&self) -> &Arc<RTCDataChannel> {
        &self.rtc_channel
    }
}

#[async_trait]
impl ReliableChannel for WebRtcChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn on_event(&self, handler: ChannelEventHandler) {
        self.events.set_handler(handler);
    }

    async fn send_text(&self, text: String) -> exphub_core::Result<()> {
        let len = text.len();
        self.rtc_channel
            .send_text(text)
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to send message: {}", e)))?;

        debug!(channel = %self.label, bytes = len, "sent text frame");
        Ok(())
    }

    async fn close(&self) -> exphub_core::Result<()> {
        self.rtc_channel
            .close()
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to close channel: {}", e)))?;

        debug!(channel = %self.label, "data channel closed");
        Ok(())
    }
}
