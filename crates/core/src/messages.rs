//! Message types exchanged over the reliable channel and the negotiation endpoint
//!
//! Every frame on the reliable channel is a JSON envelope
//! `{"type": <string>, "data": <any>}`. The set of types is owned by the
//! application; the core only interprets [`message_types::CONNECTION_OFFER`].

use crate::config::UserRole;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque per-peer metadata owned by the application layer
pub type ParticipantSummary = Value;

/// Well-known message types
pub mod message_types {
    /// Relay asks this client to establish a sub-connection
    pub const CONNECTION_OFFER: &str = "CONNECTION_OFFER";
    /// Sub-connection reply routed back through the relay
    pub const CONNECTION_ANSWER: &str = "CONNECTION_ANSWER";
    /// Negotiation endpoint answer type
    pub const SESSION_DESCRIPTION: &str = "SESSION_DESCRIPTION";

    pub const GET_SESSION_LIST: &str = "GET_SESSION_LIST";
    pub const SESSION_LIST: &str = "SESSION_LIST";
    pub const CREATE_EXPERIMENT: &str = "CREATE_EXPERIMENT";
    pub const SUCCESS: &str = "SUCCESS";
    pub const ERROR: &str = "ERROR";
    pub const CHAT: &str = "CHAT";
    pub const MUTE: &str = "MUTE";
}

/// Envelope for every message on the reliable channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Application-defined message type
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Message payload (required, may be `null`)
    pub data: Value,
}

impl Message {
    /// Create a new message
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
        }
    }

    /// Serialize to the wire representation
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a raw channel payload
    ///
    /// Fails with [`Error::Protocol`] if the text is not a JSON object with
    /// both `type` and `data`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("malformed message: {}", e)))?;

        if !value.is_object() {
            return Err(Error::Protocol(
                "malformed message: expected a JSON object".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed message: {}", e)))
    }
}

/// Session description (SDP + its type) as exchanged on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Raw SDP
    pub sdp: String,

    /// "offer", "answer", "pranswer" or "rollback"
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".to_string(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == "offer"
    }
}

/// Relayed request to establish one sub-connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOffer {
    /// Remote peer id; key of the sub-connection registry
    pub id: String,

    /// Remote peer's offer
    pub offer: SessionDescription,

    /// Opaque summary of the remote peer
    #[serde(default)]
    pub participant_summary: Option<ParticipantSummary>,
}

impl ConnectionOffer {
    /// Validate and extract an offer from a `CONNECTION_OFFER` payload
    pub fn from_value(data: Value) -> Result<Self> {
        if !data.is_object() {
            return Err(Error::Protocol(
                "invalid connection offer: expected a JSON object".to_string(),
            ));
        }

        let offer: ConnectionOffer = serde_json::from_value(data)
            .map_err(|e| Error::Protocol(format!("invalid connection offer: {}", e)))?;

        if offer.id.is_empty() {
            return Err(Error::Protocol(
                "invalid connection offer: empty id".to_string(),
            ));
        }

        Ok(offer)
    }
}

/// Reply relayed back for a [`ConnectionOffer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAnswer {
    /// Id of the offer being answered
    pub id: String,

    /// Local description of the sub-connection
    pub answer: SessionDescription,
}

/// Body of the initial negotiation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequestBody {
    pub sdp: String,

    #[serde(rename = "type")]
    pub sdp_type: String,

    pub user_type: UserRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

/// Initial negotiation request sent to the negotiation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub request: NegotiationRequestBody,
}

impl NegotiationRequest {
    /// Build a request for `offer` on behalf of `role`
    pub fn new(
        offer: &SessionDescription,
        role: UserRole,
        session_id: Option<String>,
        participant_id: Option<String>,
    ) -> Self {
        Self {
            request: NegotiationRequestBody {
                sdp: offer.sdp.clone(),
                sdp_type: offer.sdp_type.clone(),
                user_type: role,
                session_id,
                participant_id,
            },
        }
    }
}

/// Raw response of the negotiation endpoint
///
/// `data` stays untyped until [`NegotiationResponse::into_answer`] has
/// checked the response type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResponse {
    #[serde(rename = "type")]
    pub msg_type: String,

    #[serde(default)]
    pub data: Value,
}

/// Answer carried by a `SESSION_DESCRIPTION` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationAnswer {
    pub sdp: String,

    #[serde(rename = "type")]
    pub sdp_type: String,

    #[serde(default)]
    pub participant_summary: Option<ParticipantSummary>,
}

impl NegotiationAnswer {
    pub fn description(&self) -> SessionDescription {
        SessionDescription {
            sdp: self.sdp.clone(),
            sdp_type: self.sdp_type.clone(),
        }
    }
}

impl NegotiationResponse {
    pub fn is_session_description(&self) -> bool {
        self.msg_type == message_types::SESSION_DESCRIPTION
    }

    /// Extract the answer, failing for any type other than `SESSION_DESCRIPTION`
    pub fn into_answer(self) -> Result<NegotiationAnswer> {
        if !self.is_session_description() {
            return Err(Error::Negotiation(format!(
                "unexpected answer type '{}'",
                self.msg_type
            )));
        }

        serde_json::from_value(self.data)
            .map_err(|e| Error::Negotiation(format!("malformed session description: {}", e)))
    }
}
