//! Error types for the Experimental Hub connection core

use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type alias for connection core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the connection core
///
/// Only [`Error::Configuration`] and [`Error::State`] are ever returned to a
/// caller of the public connection API. Transport and negotiation failures
/// that happen after `start()` has been kicked off are reported through the
/// `connectionStateChange` event instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. participant ids absent)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation invoked while the connection is in an incompatible state
    #[error("Cannot {operation} while connection is {state}")]
    State {
        /// The rejected operation
        operation: &'static str,
        /// State the connection was in
        state: ConnectionState,
    },

    /// Transport primitive failure (ICE, SDP, data channel)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Negotiation endpoint failure or unexpected answer
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Operation timeout (ICE gathering, channel open)
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Malformed inbound message or offer
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (config file loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a state error for `operation` attempted in `state`
    pub fn state(operation: &'static str, state: ConnectionState) -> Self {
        Error::State { operation, state }
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this error signals caller misuse of the state machine
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State { .. })
    }

    /// Check if this error is a transport-level failure
    ///
    /// These never escape `start()`; they drive the connection to `Failed`.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Negotiation(_) | Error::Timeout(_)
        )
    }

    /// Check if this error is a protocol violation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Serialization(_))
    }
}
