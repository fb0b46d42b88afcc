//! The `chainstreamApi` credential: OAuth2 client-credentials exchange and
//! bearer-token injection.

use async_trait::async_trait;
use nodes::{CredentialData, CredentialType, HostError, HttpMethod, HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::models::{ChainstreamCredential, CREDENTIAL_NAME};

const AUDIENCE: &str = "https://api.dex.chainstream.io";
const SCOPE: &str = "webhook.read webhook.write";
const SESSION_TOKEN: &str = "sessionToken";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Credential type registered with the host for every Chainstream node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainstreamApi;

impl ChainstreamApi {
    /// Token endpoint for a configured auth domain. The domain is normally a
    /// bare host name; a value that already carries a scheme is kept as-is.
    pub fn token_url(domain: &str) -> String {
        let domain = domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{domain}/oauth/token")
        } else {
            format!("https://{domain}/oauth/token")
        }
    }
}

#[async_trait]
impl CredentialType for ChainstreamApi {
    fn name(&self) -> &'static str {
        CREDENTIAL_NAME
    }

    fn is_expired(&self, data: &CredentialData) -> bool {
        data.get(SESSION_TOKEN)
            .and_then(Value::as_str)
            .map(|t| t.trim().is_empty())
            .unwrap_or(true)
    }

    #[instrument(skip_all)]
    async fn pre_authenticate(
        &self,
        http: &dyn HttpTransport,
        data: &CredentialData,
    ) -> Result<CredentialData, HostError> {
        let credential = ChainstreamCredential::from_data(data)
            .map_err(|e| HostError::Authentication(e.to_string()))?;

        let mut request = HttpRequest::new(HttpMethod::Post, Self::token_url(&credential.domain))
            .with_body(json!({
                "client_id": credential.client_id,
                "client_secret": credential.client_secret,
                "audience": AUDIENCE,
                "grant_type": "client_credentials",
                "scope": SCOPE,
            }));
        request.set_header("Content-Type", "application/json");

        debug!("requesting session token from {}", request.url);
        let response = http
            .send(request)
            .await
            .map_err(|e| HostError::Authentication(e.to_string()))?;

        let token = serde_json::from_value::<TokenResponse>(response)
            .ok()
            .and_then(|r| r.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                HostError::Authentication("token response carried no access_token".to_string())
            })?;

        let mut derived = CredentialData::new();
        derived.insert(SESSION_TOKEN.to_string(), Value::String(token));
        Ok(derived)
    }

    fn authenticate(&self, data: &CredentialData, request: &mut HttpRequest) {
        let token = data.get(SESSION_TOKEN).and_then(Value::as_str).unwrap_or("");
        request.set_header("Authorization", format!("Bearer {token}"));
    }
}
