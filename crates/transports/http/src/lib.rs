//! HTTP negotiation endpoint client for Experimental Hub connections
//!
//! The hub accepts the initial SDP offer of a
//! [`MainConnection`](exphub_core::MainConnection) on a plain HTTP endpoint
//! and answers with the relay's session description. [`HttpNegotiator`]
//! implements [`exphub_core::Negotiator`] over `reqwest`.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use exphub_http::HttpNegotiator;
//!
//! let negotiator = HttpNegotiator::new("http://localhost:8080/offer")?;
//! assert_eq!(negotiator.url(), "http://localhost:8080/offer");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod negotiator;

pub use error::{Error, Result};
pub use negotiator::{HttpNegotiator, DEFAULT_TIMEOUT};
