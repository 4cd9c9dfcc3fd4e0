//! Configuration types for hub connections

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Role a client plays in a hub session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Joins one session as a known participant (requires ids)
    Participant,
    /// Manages sessions and observes participants
    Experimenter,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Participant => write!(f, "participant"),
            UserRole::Experimenter => write!(f, "experimenter"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "participant" => Ok(UserRole::Participant),
            "experimenter" => Ok(UserRole::Experimenter),
            other => Err(Error::Configuration(format!(
                "unknown role '{}', expected 'participant' or 'experimenter'",
                other
            ))),
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Configuration for a [`MainConnection`](crate::MainConnection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Role of this client
    pub role: UserRole,

    /// Session to join (required for participants)
    pub session_id: Option<String>,

    /// Participant identity inside the session (required for participants)
    pub participant_id: Option<String>,

    /// Negotiation endpoint receiving the initial offer (http:// or https://)
    pub negotiation_url: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Label of the reliable message channel (default: "API")
    pub data_channel_label: String,

    /// Upper bound on waiting for ICE gathering to complete (default: 10)
    pub ice_gathering_timeout_secs: u64,

    /// Log a warning for inbound message types nobody subscribed to
    pub warn_unhandled_messages: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            role: UserRole::Experimenter,
            session_id: None,
            participant_id: None,
            negotiation_url: "http://localhost:8080/offer".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            data_channel_label: "API".to_string(),
            ice_gathering_timeout_secs: 10,
            warn_unhandled_messages: true,
        }
    }
}

impl ConnectionConfig {
    /// Configuration for an experimenter client
    pub fn experimenter(negotiation_url: &str) -> Self {
        Self {
            role: UserRole::Experimenter,
            negotiation_url: negotiation_url.to_string(),
            ..Default::default()
        }
    }

    /// Configuration for a participant joining `session_id` as `participant_id`
    pub fn participant(negotiation_url: &str, session_id: &str, participant_id: &str) -> Self {
        Self {
            role: UserRole::Participant,
            session_id: Some(session_id.to_string()),
            participant_id: Some(participant_id.to_string()),
            negotiation_url: negotiation_url.to_string(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::Configuration(format!("Invalid config TOML: {}", e)))
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// ICE gathering timeout as a [`Duration`]
    pub fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_secs(self.ice_gathering_timeout_secs)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if:
    /// - the role is `participant` and `session_id` or `participant_id` is missing
    /// - `negotiation_url` is not an http(s) URL
    /// - `stun_servers` is empty
    /// - `data_channel_label` is empty
    /// - `ice_gathering_timeout_secs` is zero
    pub fn validate(&self) -> Result<()> {
        if self.role == UserRole::Participant {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
            if missing(&self.session_id) || missing(&self.participant_id) {
                return Err(Error::Configuration(
                    "participant connections require both session_id and participant_id"
                        .to_string(),
                ));
            }
        }

        if !self.negotiation_url.starts_with("http://")
            && !self.negotiation_url.starts_with("https://")
        {
            return Err(Error::Configuration(format!(
                "negotiation_url must start with http:// or https://, got {}",
                self.negotiation_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::Configuration(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.data_channel_label.is_empty() {
            return Err(Error::Configuration(
                "data_channel_label must not be empty".to_string(),
            ));
        }

        if self.ice_gathering_timeout_secs == 0 {
            return Err(Error::Configuration(
                "ice_gathering_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
