//! Error taxonomy for discovery passes.
//!
//! Hard errors abort the pass that raised them: configuration mistakes,
//! transport failures, non-success HTTP statuses, and malformed response
//! envelopes. Soft data errors (an item without a usable object id) are
//! logged at the point of discovery and never surface here.

use http::StatusCode;
use thiserror::Error;

/// Errors produced by a caller-supplied [`RequestDriver`].
///
/// Drivers wrap arbitrary clients (plain HTTP, signed SDK transports), so
/// the contract stays open-ended.
///
/// [`RequestDriver`]: crate::discovery::request::RequestDriver
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid or missing discovery configuration. Never retried.
    #[error("invalid discovery configuration: {0}")]
    Config(String),

    /// The request driver failed outright (connection refused, timeout,
    /// TLS failure). Aborts the whole pass for this tick.
    #[error("discovery request failed")]
    Transport(#[source] DriverError),

    /// The provider answered with a non-success status.
    #[error("discovery operation {operation} returned status {status}")]
    Http {
        status: StatusCode,
        operation: String,
    },

    /// The response body does not match the expected envelope shape.
    #[error("unexpected discovery response shape: {0}")]
    Schema(String),
}
