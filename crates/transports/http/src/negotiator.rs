//! Negotiator posting the initial offer to the hub's HTTP endpoint

use crate::{Error, Result};
use async_trait::async_trait;
use exphub_core::{Negotiator, NegotiationRequest, NegotiationResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default upper bound on one negotiation round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body kept in [`Error::Status`]
const MAX_ERROR_BODY: usize = 512;

/// `POST <url>` with the JSON negotiation request, JSON response
pub struct HttpNegotiator {
    client: Client,
    url: String,
}

impl HttpNegotiator {
    /// Negotiator for `url` with [`DEFAULT_TIMEOUT`]
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidEndpoint(format!(
                "'{}' is not an http:// or https:// URL",
                url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidEndpoint(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: &NegotiationRequest) -> Result<NegotiationResponse> {
        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    #[instrument(skip_all, fields(url = %self.url, user_type = %request.request.user_type))]
    async fn negotiate(
        &self,
        request: NegotiationRequest,
    ) -> exphub_core::Result<NegotiationResponse> {
        match self.post(&request).await {
            Ok(response) => {
                debug!(response_type = %response.msg_type, "negotiation response received");
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "negotiation request failed");
                Err(e.into())
            }
        }
    }
}
