//! `chainstream` crate — Chainstream API nodes for the workflow host.
//!
//! Exposes three things to the host:
//! - [`ChainstreamNode`]: request/response action node.
//! - [`ChainstreamTrigger`]: webhook trigger with subscription lifecycle and
//!   signature verification.
//! - [`ChainstreamApi`]: the OAuth2 client-credentials credential type.

pub mod client;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod node;
pub mod params;
pub mod trigger;
pub mod verify;

pub use credentials::ChainstreamApi;
pub use dispatch::{Dispatcher, OperationSpec};
pub use error::ChainstreamError;
pub use models::{ChainstreamCredential, RequestSpec, WebhookSubscription, WebhookTopic};
pub use node::ChainstreamNode;
pub use trigger::ChainstreamTrigger;
