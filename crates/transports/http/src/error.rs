//! Error types for the HTTP negotiator

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Endpoint URL rejected before any request was made
    #[error("Invalid negotiation endpoint: {0}")]
    InvalidEndpoint(String),

    /// Request never produced a response (connect error, timeout)
    #[error("Request to negotiation endpoint failed: {0}")]
    Request(String),

    /// Endpoint answered with a non-2xx status
    #[error("Negotiation endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body is not a negotiation response
    #[error("Invalid negotiation response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// HTTP status of the response, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::Status {
                status: status.as_u16(),
                body: String::new(),
            },
            None if err.is_decode() => Error::InvalidResponse(err.to_string()),
            None => Error::Request(err.to_string()),
        }
    }
}

impl From<Error> for exphub_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidEndpoint(msg) => exphub_core::Error::Configuration(msg),
            other => exphub_core::Error::Negotiation(other.to_string()),
        }
    }
}
