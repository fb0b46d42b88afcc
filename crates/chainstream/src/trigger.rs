//! The `chainstreamTrigger` webhook node.
//!
//! Lifecycle: `check_exists` → `create` on activation, `delete` on
//! deactivation. The subscription id (and later the signing secret) live in
//! the node's static data; see [`WebhookSubscription`].

use async_trait::async_trait;
use chrono::Utc;
use nodes::{ExecutionContext, HttpMethod, WebhookEnvelope, WebhookNode, WebhookResponse};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::client::api_request;
use crate::models::{RequestSpec, WebhookSubscription, WebhookTopic};
use crate::verify::{self, detect_scheme};
use crate::ChainstreamError;

pub const TRIGGER_TYPE: &str = "chainstreamTrigger";

const ENDPOINT: &str = "webhook/endpoint";

/// Webhook trigger for Chainstream token events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainstreamTrigger;

impl ChainstreamTrigger {
    /// Configured topic; an unknown value falls back to the default topic.
    pub fn topic(ctx: &ExecutionContext) -> WebhookTopic {
        let raw = ctx
            .parameters
            .get("topic", 0)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        match raw {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}; using {}", e, WebhookTopic::default());
                WebhookTopic::default()
            }),
            None => WebhookTopic::default(),
        }
    }

    fn filter(ctx: &ExecutionContext) -> Option<String> {
        ctx.parameters
            .get("filter", 0)
            .ok()
            .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    fn callback_url(ctx: &ExecutionContext) -> Result<&str, ChainstreamError> {
        ctx.webhook_url
            .as_deref()
            .ok_or(ChainstreamError::MissingCallbackUrl)
    }

    /// Look upstream for a subscription pointing at this node's callback URL
    /// and record it when found.
    pub async fn find_existing(&self, ctx: &ExecutionContext) -> Result<Option<String>, ChainstreamError> {
        let callback_url = Self::callback_url(ctx)?;
        let response = api_request(ctx, &RequestSpec::get(ENDPOINT), None).await?;
        debug!("listed webhook endpoints: {}", response);

        let endpoints = match &response {
            Value::Array(list) => list.as_slice(),
            other => other
                .get("data")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        };
        let Some(id) = endpoints
            .iter()
            .find(|ep| ep.get("url").and_then(Value::as_str) == Some(callback_url))
            .and_then(extract_id)
        else {
            return Ok(None);
        };

        let store = ctx.static_data.as_ref();
        let cached_secret = WebhookSubscription::load(store)
            .filter(|sub| sub.id == id)
            .and_then(|sub| sub.secret);
        WebhookSubscription {
            id: id.clone(),
            topic: Some(Self::topic(ctx)),
            callback_url: Some(callback_url.to_string()),
            secret: cached_secret,
        }
        .store(store);
        Ok(Some(id))
    }

    /// Register this node's callback URL for the configured topic.
    pub async fn subscribe(&self, ctx: &ExecutionContext) -> Result<WebhookSubscription, ChainstreamError> {
        let callback_url = Self::callback_url(ctx)?.to_string();
        let topic = Self::topic(ctx);

        let mut body = Map::new();
        body.insert("filterTypes".into(), json!([topic.as_str()]));
        body.insert("url".into(), Value::String(callback_url.clone()));
        if let Some(filter) = Self::filter(ctx) {
            body.insert("filter".into(), Value::String(filter));
        }

        debug!("creating webhook endpoint for {}", topic);
        let spec = RequestSpec::new(HttpMethod::Post, ENDPOINT).with_body(body);
        let response = api_request(ctx, &spec, None).await?;
        let id = extract_id(&response).ok_or(ChainstreamError::WebhookRegistrationFailed)?;

        let subscription = WebhookSubscription {
            id,
            topic: Some(topic),
            callback_url: Some(callback_url),
            secret: None,
        };
        subscription.store(ctx.static_data.as_ref());
        Ok(subscription)
    }

    /// Remove the recorded subscription upstream, then forget it.
    /// State is kept when the upstream call fails.
    pub async fn unsubscribe(&self, ctx: &ExecutionContext) -> Result<(), ChainstreamError> {
        let store = ctx.static_data.as_ref();
        let Some(subscription) = WebhookSubscription::load(store) else {
            return Ok(());
        };

        let spec = RequestSpec::new(HttpMethod::Delete, format!("{ENDPOINT}/{}", subscription.id));
        api_request(ctx, &spec, None).await?;
        WebhookSubscription::clear(store);
        Ok(())
    }

    /// Signing secret for the recorded subscription, fetched once and cached.
    pub async fn signing_secret(&self, ctx: &ExecutionContext) -> Result<String, ChainstreamError> {
        let store = ctx.static_data.as_ref();
        let mut subscription = WebhookSubscription::load(store).ok_or_else(|| {
            ChainstreamError::SignatureRejected("no subscription recorded for this node".into())
        })?;
        if let Some(secret) = &subscription.secret {
            return Ok(secret.clone());
        }

        let spec = RequestSpec::get(format!("{ENDPOINT}/{}/secret", subscription.id));
        let response = api_request(ctx, &spec, None).await?;
        let secret = response
            .get("secret")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ChainstreamError::SignatureRejected("secret response had no secret".into()))?;

        subscription.secret = Some(secret.clone());
        subscription.store(store);
        Ok(secret)
    }

    /// Verify one delivery against wall-clock time `now` (unix seconds).
    ///
    /// Never fails: rejected deliveries yield an empty response. When no
    /// subscription is recorded, or the secret request itself fails, the
    /// delivery is accepted unverified. A secret response that carries no
    /// secret rejects.
    pub async fn handle(&self, envelope: WebhookEnvelope, ctx: &ExecutionContext, now: i64) -> WebhookResponse {
        if detect_scheme(&envelope).is_none() {
            warn!("no signature header found in webhook request");
            return WebhookResponse::reject();
        }

        if WebhookSubscription::load(ctx.static_data.as_ref()).is_none() {
            warn!("no subscription recorded for this node, accepting without verification");
            return WebhookResponse::accept(envelope.body);
        }

        // Only an unreachable secret endpoint fails open; a secret response
        // without a usable secret rejects.
        let secret = match self.signing_secret(ctx).await {
            Ok(secret) => secret,
            Err(err @ ChainstreamError::Transport(_)) => {
                warn!("could not get webhook secret, accepting without verification: {}", err);
                return WebhookResponse::accept(envelope.body);
            }
            Err(err) => {
                warn!("{}", err);
                return WebhookResponse::reject();
            }
        };

        match verify::verify(&envelope, &secret, Self::topic(ctx), now) {
            Ok(scheme) => {
                debug!("webhook signature verified ({:?})", scheme);
                WebhookResponse::accept(envelope.body)
            }
            Err(err) => {
                warn!("{}", err);
                WebhookResponse::reject()
            }
        }
    }
}

/// Subscription id from a create/list response: `id` at the top level or
/// under `data`. Numeric ids are accepted and rendered as strings.
fn extract_id(value: &Value) -> Option<String> {
    let id = value
        .get("id")
        .or_else(|| value.get("data").and_then(|d| d.get("id")))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl WebhookNode for ChainstreamTrigger {
    #[instrument(skip_all, fields(node = %ctx.node_name))]
    async fn check_exists(&self, ctx: &ExecutionContext) -> bool {
        match self.find_existing(ctx).await {
            Ok(Some(id)) => {
                info!("webhook endpoint {} already registered", id);
                true
            }
            Ok(None) => false,
            Err(err) => {
                error!("checking webhook endpoints failed: {}", err);
                false
            }
        }
    }

    #[instrument(skip_all, fields(node = %ctx.node_name))]
    async fn create(&self, ctx: &ExecutionContext) -> bool {
        match self.subscribe(ctx).await {
            Ok(subscription) => {
                info!("registered webhook endpoint {}", subscription.id);
                true
            }
            Err(err) => {
                error!("webhook registration failed: {}", err);
                false
            }
        }
    }

    #[instrument(skip_all, fields(node = %ctx.node_name))]
    async fn delete(&self, ctx: &ExecutionContext) -> bool {
        match self.unsubscribe(ctx).await {
            Ok(()) => true,
            Err(err) => {
                error!("deleting webhook endpoint failed: {}", err);
                false
            }
        }
    }

    #[instrument(skip_all, fields(node = %ctx.node_name))]
    async fn webhook(&self, envelope: WebhookEnvelope, ctx: &ExecutionContext) -> WebhookResponse {
        self.handle(envelope, ctx, Utc::now().timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_read_from_top_level_or_data() {
        assert_eq!(extract_id(&json!({ "id": "ep_1" })), Some("ep_1".into()));
        assert_eq!(extract_id(&json!({ "data": { "id": "ep_2" } })), Some("ep_2".into()));
        assert_eq!(extract_id(&json!({ "id": 42 })), Some("42".into()));
        assert_eq!(extract_id(&json!({ "id": "" })), None);
        assert_eq!(extract_id(&json!({ "ok": true })), None);
        assert_eq!(extract_id(&Value::Null), None);
    }
}
