//! The contract between the host runtime and the nodes it runs.
//!
//! The host owns the item loop, credential storage, HTTP transport, per-node
//! static data and the webhook server. Nodes reach all of it through the
//! traits below, bundled into an [`ExecutionContext`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::data::{NodeOutput, WebhookEnvelope, WebhookResponse};
use crate::http::{HttpRequest, HttpTransport};
use crate::{HostError, NodeError};

/// Decrypted credential fields, keyed by field name.
pub type CredentialData = Map<String, Value>;

// ---------------------------------------------------------------------------
// Host collaborators
// ---------------------------------------------------------------------------

/// Read access to the node's configured parameters.
pub trait Parameters: Send + Sync {
    /// Value of `name` for input item `item`.
    ///
    /// Fails with [`HostError::UndefinedParameter`] when the parameter is not
    /// declared for the node's current configuration.
    fn get(&self, name: &str, item: usize) -> Result<Value, HostError>;

    /// Names of all parameters currently defined, in host order.
    fn names(&self) -> Vec<String>;
}

/// Per-node key/value store that survives between activations.
///
/// The host creates one handle per node instance on activation and drops
/// it when the node is removed. It never runs two invocations for the same
/// node concurrently, so implementations need no cross-call locking.
pub trait StaticData: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn remove(&self, key: &str) -> Option<Value>;
    fn clear(&self);
}

/// Host-side credential storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<CredentialData, HostError>;
    async fn update(&self, name: &str, data: CredentialData) -> Result<(), HostError>;
}

/// A credential kind a node declares: how to obtain and inject auth.
#[async_trait]
pub trait CredentialType: Send + Sync {
    /// Name the credential is stored under.
    fn name(&self) -> &'static str;

    /// Whether the derived fields must be refreshed before the next request.
    fn is_expired(&self, data: &CredentialData) -> bool;

    /// Exchange the configured fields for derived ones (e.g. a session token).
    /// The returned map is merged into the stored credential.
    async fn pre_authenticate(
        &self,
        http: &dyn HttpTransport,
        data: &CredentialData,
    ) -> Result<CredentialData, HostError>;

    /// Inject auth into an outbound request.
    fn authenticate(&self, data: &CredentialData, request: &mut HttpRequest);
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Shared context passed to every node call.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Display name of the node instance.
    pub node_name: String,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    pub parameters: Arc<dyn Parameters>,
    pub credentials: Arc<dyn CredentialStore>,
    pub http: Arc<dyn HttpTransport>,
    pub static_data: Arc<dyn StaticData>,
    /// Callback URL the host serves this node's webhook on.
    pub webhook_url: Option<String>,
    /// Capture per-item errors as output instead of aborting the run.
    pub continue_on_fail: bool,
}

impl ExecutionContext {
    pub fn new(
        node_name: impl Into<String>,
        parameters: Arc<dyn Parameters>,
        credentials: Arc<dyn CredentialStore>,
        http: Arc<dyn HttpTransport>,
        static_data: Arc<dyn StaticData>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            execution_id: Uuid::new_v4(),
            parameters,
            credentials,
            http,
            static_data,
            webhook_url: None,
            continue_on_fail: false,
        }
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_continue_on_fail(mut self, enabled: bool) -> Self {
        self.continue_on_fail = enabled;
        self
    }

    pub async fn get_credentials(&self, name: &str) -> Result<CredentialData, HostError> {
        self.credentials.get(name).await
    }

    /// Send `request` with auth from `credential_type` injected.
    ///
    /// Derived credential fields are refreshed up front when expired, and
    /// once more if the upstream answers 401.
    #[instrument(
        skip(self, credential_type, request),
        fields(node = %self.node_name, method = request.method.as_str(), url = %request.url)
    )]
    pub async fn http_request_with_authentication(
        &self,
        credential_type: &dyn CredentialType,
        request: HttpRequest,
    ) -> Result<Value, HostError> {
        let mut data = self.credentials.get(credential_type.name()).await?;
        if credential_type.is_expired(&data) {
            debug!("credential '{}' expired, pre-authenticating", credential_type.name());
            data = self.refresh_credential(credential_type, data).await?;
        }

        let mut first = request.clone();
        credential_type.authenticate(&data, &mut first);
        match self.http.send(first).await {
            Err(HostError::Status { status: 401, .. }) => {
                warn!(
                    "credential '{}' rejected with 401, refreshing once",
                    credential_type.name()
                );
                let data = self.refresh_credential(credential_type, data).await?;
                let mut retry = request;
                credential_type.authenticate(&data, &mut retry);
                self.http.send(retry).await
            }
            other => other,
        }
    }

    async fn refresh_credential(
        &self,
        credential_type: &dyn CredentialType,
        mut data: CredentialData,
    ) -> Result<CredentialData, HostError> {
        let derived = credential_type
            .pre_authenticate(self.http.as_ref(), &data)
            .await?;
        data.extend(derived);
        self.credentials
            .update(credential_type.name(), data.clone())
            .await?;
        Ok(data)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node_name", &self.node_name)
            .field("execution_id", &self.execution_id)
            .field("webhook_url", &self.webhook_url)
            .field("continue_on_fail", &self.continue_on_fail)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Node traits
// ---------------------------------------------------------------------------

/// A node that maps input items to output items.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Process `items` in order and return the outputs, each paired to the
    /// input item it came from.
    async fn execute(
        &self,
        items: Vec<Value>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<NodeOutput>, NodeError>;
}

/// A node started by inbound webhook deliveries.
///
/// The lifecycle hooks report outcomes as booleans; they never fail.
#[async_trait]
pub trait WebhookNode: Send + Sync {
    /// Whether the upstream already has a subscription for `ctx.webhook_url`.
    async fn check_exists(&self, ctx: &ExecutionContext) -> bool;

    /// Register `ctx.webhook_url` upstream.
    async fn create(&self, ctx: &ExecutionContext) -> bool;

    /// Remove the recorded subscription upstream.
    async fn delete(&self, ctx: &ExecutionContext) -> bool;

    /// Handle one delivery. Never fails; a dropped delivery is an empty response.
    async fn webhook(&self, envelope: WebhookEnvelope, ctx: &ExecutionContext) -> WebhookResponse;
}
