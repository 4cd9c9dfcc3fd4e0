//! webrtc-rs transport for Experimental Hub connections
//!
//! Implements the capability traits of [`exphub_core::transport`] on top of
//! webrtc-rs:
//!
//! - [`WebRtcTransportFactory`]: builds the webrtc-rs API once (default
//!   codecs, interceptors, ICE servers) and hands out one transport per
//!   connection
//! - [`WebRtcTransport`]: one `RTCPeerConnection`
//! - [`WebRtcChannel`]: the ordered, reliable data channel carrying typed
//!   messages
//! - [`WebRtcLocalTrack`] / [`WebRtcRemoteTrack`]: media track handles
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use exphub_core::{ConnectionConfig, TransportFactory};
//! use exphub_webrtc::WebRtcTransportFactory;
//!
//! let factory = WebRtcTransportFactory::new(&ConnectionConfig::default())?;
//! let transport = factory.create_transport().await?;
//! let channel = transport.create_channel("API").await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod factory;
mod forwarder;
pub mod track;
pub mod transport;

pub use channel::WebRtcChannel;
pub use error::{Error, Result};
pub use factory::WebRtcTransportFactory;
pub use track::{WebRtcLocalTrack, WebRtcRemoteTrack};
pub use transport::WebRtcTransport;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
