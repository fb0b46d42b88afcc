//! Core data types shared by the Chainstream nodes.
//!
//! These types are the source of truth for what a credential, an outbound
//! request and a webhook subscription look like in memory.

use std::fmt;
use std::str::FromStr;

use nodes::{CredentialData, HttpMethod, StaticData};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ChainstreamError;

/// Name the credential is registered under in the host.
pub const CREDENTIAL_NAME: &str = "chainstreamApi";

pub const DEFAULT_API_BASE_URL: &str = "https://api-dex.chainstream.io";
pub const DEFAULT_AUTH_DOMAIN: &str = "dex.asia.auth.chainstream.io";

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// The `chainstreamApi` credential as configured by the user.
///
/// `session_token` is derived: the credential resolver fills it in and the
/// host stores it alongside the configured fields.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainstreamCredential {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub session_token: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_domain() -> String {
    DEFAULT_AUTH_DOMAIN.to_string()
}

impl ChainstreamCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            api_base_url: default_api_base_url(),
            domain: default_domain(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            session_token: String::new(),
        }
    }

    /// Decode the host's loosely-typed credential record.
    pub fn from_data(data: &CredentialData) -> Result<Self, ChainstreamError> {
        serde_json::from_value(Value::Object(data.clone()))
            .map_err(|e| ChainstreamError::InvalidCredential(e.to_string()))
    }

    /// Encode for storage in the host's credential store.
    pub fn to_data(&self) -> CredentialData {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => CredentialData::new(),
        }
    }
}

impl fmt::Debug for ChainstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainstreamCredential")
            .field("api_base_url", &self.api_base_url)
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RequestSpec
// ---------------------------------------------------------------------------

/// One logical API call, relative to `{apiBaseUrl}/v1/`.
///
/// Built fresh per item and consumed once by the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Map::new(),
            body: Map::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }
}

// ---------------------------------------------------------------------------
// Webhook topic
// ---------------------------------------------------------------------------

/// Event category a subscription filters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WebhookTopic {
    #[default]
    #[serde(rename = "sol.token.migrated")]
    TokenMigrated,
    #[serde(rename = "sol.token.created")]
    TokenCreated,
}

impl WebhookTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookTopic::TokenMigrated => "sol.token.migrated",
            WebhookTopic::TokenCreated => "sol.token.created",
        }
    }
}

impl FromStr for WebhookTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sol.token.migrated" => Ok(WebhookTopic::TokenMigrated),
            "sol.token.created" => Ok(WebhookTopic::TokenCreated),
            other => Err(format!("unknown webhook topic '{other}'")),
        }
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WebhookSubscription
// ---------------------------------------------------------------------------

/// Static-data keys the subscription is persisted under.
pub mod keys {
    pub const WEBHOOK_ID: &str = "webhookId";
    pub const TOPIC: &str = "topic";
    pub const CALLBACK_URL: &str = "callbackUrl";
    pub const SECRET: &str = "secret";
}

/// An upstream webhook registration owned by one trigger node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSubscription {
    pub id: String,
    pub topic: Option<WebhookTopic>,
    pub callback_url: Option<String>,
    /// Signing secret, fetched lazily and cached once obtained.
    pub secret: Option<String>,
}

impl WebhookSubscription {
    /// Read the subscription recorded in `store`, if any.
    pub fn load(store: &dyn StaticData) -> Option<Self> {
        let id = string_entry(store, keys::WEBHOOK_ID)?;
        Some(Self {
            id,
            topic: string_entry(store, keys::TOPIC).and_then(|t| t.parse().ok()),
            callback_url: string_entry(store, keys::CALLBACK_URL),
            secret: string_entry(store, keys::SECRET),
        })
    }

    /// Record this subscription, replacing whatever was there.
    pub fn store(&self, store: &dyn StaticData) {
        store.set(keys::WEBHOOK_ID, Value::String(self.id.clone()));
        set_or_remove(store, keys::TOPIC, self.topic.map(|t| t.as_str().to_string()));
        set_or_remove(store, keys::CALLBACK_URL, self.callback_url.clone());
        set_or_remove(store, keys::SECRET, self.secret.clone());
    }

    /// Forget any recorded subscription.
    pub fn clear(store: &dyn StaticData) {
        for key in [keys::WEBHOOK_ID, keys::TOPIC, keys::CALLBACK_URL, keys::SECRET] {
            store.remove(key);
        }
    }
}

fn string_entry(store: &dyn StaticData, key: &str) -> Option<String> {
    store
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty())
}

fn set_or_remove(store: &dyn StaticData, key: &str, value: Option<String>) {
    match value {
        Some(v) => store.set(key, Value::String(v)),
        None => {
            store.remove(key);
        }
    }
}

// ---------------------------------------------------------------------------
// Chain options
// ---------------------------------------------------------------------------

/// One entry of the chain picker: display name plus the code sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOption {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::memory::MemoryStaticData;
    use serde_json::json;

    #[test]
    fn credential_defaults_fill_missing_urls() {
        let mut data = CredentialData::new();
        data.insert("clientId".into(), json!("id"));
        data.insert("clientSecret".into(), json!("shh"));
        let cred = ChainstreamCredential::from_data(&data).unwrap();
        assert_eq!(cred.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cred.domain, DEFAULT_AUTH_DOMAIN);
        assert!(cred.session_token.is_empty());
    }

    #[test]
    fn credential_without_client_id_is_invalid() {
        let data = CredentialData::new();
        assert!(matches!(
            ChainstreamCredential::from_data(&data),
            Err(ChainstreamError::InvalidCredential(_))
        ));
    }

    #[test]
    fn credential_debug_hides_secrets() {
        let mut cred = ChainstreamCredential::new("id", "top-secret");
        cred.session_token = "tok".into();
        let printed = format!("{cred:?}");
        assert!(!printed.contains("top-secret"));
        assert!(!printed.contains("tok\""));
    }

    #[test]
    fn topic_parses_and_serialises_as_wire_name() {
        assert_eq!("sol.token.created".parse::<WebhookTopic>(), Ok(WebhookTopic::TokenCreated));
        assert!("eth.token.created".parse::<WebhookTopic>().is_err());
        assert_eq!(serde_json::to_value(WebhookTopic::TokenMigrated).unwrap(), json!("sol.token.migrated"));
    }

    #[test]
    fn subscription_store_and_load() {
        let store = MemoryStaticData::new();
        assert!(WebhookSubscription::load(&store).is_none());

        let sub = WebhookSubscription {
            id: "ep_1".into(),
            topic: Some(WebhookTopic::TokenCreated),
            callback_url: Some("https://host.test/webhook".into()),
            secret: None,
        };
        sub.store(&store);
        assert_eq!(WebhookSubscription::load(&store), Some(sub));

        WebhookSubscription::clear(&store);
        assert!(WebhookSubscription::load(&store).is_none());
    }
}
