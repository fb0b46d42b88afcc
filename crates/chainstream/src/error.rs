//! Plugin-level error types.

use nodes::HostError;
use thiserror::Error;

/// Errors produced while building or sending Chainstream requests and
/// while handling webhooks.
#[derive(Debug, Error, Clone)]
pub enum ChainstreamError {
    // ------ Configuration errors ------

    /// No candidate parameter produced a usable value.
    #[error("could not find {field} parameter. Tried: {tried}. Available parameters: {available}")]
    ParameterNotFound {
        field: &'static str,
        tried: String,
        available: String,
    },

    /// The resource has no handler table.
    #[error("the resource '{0}' is not known")]
    UnsupportedResource(String),

    /// The operation is not registered under the resource.
    #[error("the operation '{operation}' is not known for resource '{resource}'")]
    UnsupportedOperation {
        resource: String,
        operation: String,
    },

    /// The stored credential is missing a field or holds a bad value.
    #[error("invalid chainstreamApi credential: {0}")]
    InvalidCredential(String),

    /// The host has not assigned a callback URL to the trigger node.
    #[error("no webhook callback URL is assigned to this node")]
    MissingCallbackUrl,

    // ------ Runtime errors ------

    /// Network, HTTP status or auth failure from the host transport.
    #[error(transparent)]
    Transport(#[from] HostError),

    /// The upstream accepted a subscription request but returned no id.
    #[error("webhook registration returned no subscription id")]
    WebhookRegistrationFailed,

    /// An inbound delivery failed verification.
    #[error("webhook rejected: {0}")]
    SignatureRejected(String),
}
