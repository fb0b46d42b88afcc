//! `nodes` crate — the host contract every node is written against.
//!
//! Nodes implement [`ExecutableNode`] and/or [`WebhookNode`] and reach the
//! host only through the collaborators bundled in [`ExecutionContext`].
//! [`memory`] and [`mock`] provide stand-ins for running without a host.

pub mod data;
pub mod error;
pub mod http;
pub mod memory;
pub mod mock;
pub mod traits;

pub use data::{return_json_array, NodeOutput, WebhookEnvelope, WebhookResponse};
pub use error::{HostError, NodeError};
pub use http::{HttpMethod, HttpRequest, HttpTransport, ReqwestTransport};
pub use traits::{
    CredentialData, CredentialStore, CredentialType, ExecutableNode, ExecutionContext,
    Parameters, StaticData, WebhookNode,
};

#[cfg(test)]
mod context_tests;
