//! Node-level and host-level error types.

use thiserror::Error;

/// Errors raised by the host collaborators a node talks to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The parameter is not declared for the node's current configuration.
    #[error("parameter '{0}' is not defined for this node")]
    UndefinedParameter(String),

    /// No credential with this name is configured.
    #[error("credential '{0}' is not configured")]
    CredentialNotFound(String),

    /// The request never produced a response (DNS, TLS, connection reset…).
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered with a non-2xx status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded as JSON.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// Pre-authentication (token exchange) failed.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl HostError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors returned by a node's `execute` method.
///
/// The host uses the variant to decide how to report the failure:
/// - `Item`  — attributed to one input item; the run is aborted.
/// - `Fatal` — misconfiguration not tied to any item.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Processing of one item failed and `continue_on_fail` was off.
    #[error("item {item}: {message}")]
    Item { item: usize, message: String },

    /// Permanent failure outside the per-item loop.
    #[error("fatal node error: {0}")]
    Fatal(String),
}
