//! Generic Chainstream API client.
//!
//! Turns a [`RequestSpec`] into an absolute request and sends it through the
//! host's authenticated transport. Single shot: no retries, no caching.

use nodes::{ExecutionContext, HttpRequest};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::credentials::ChainstreamApi;
use crate::models::{ChainOption, ChainstreamCredential, RequestSpec, CREDENTIAL_NAME};
use crate::ChainstreamError;

/// Normalise the configured API base URL: add `https://` when no scheme is
/// given, drop query/fragment and any trailing slash.
pub fn normalize_base_url(raw: &str) -> Result<String, ChainstreamError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ChainstreamError::InvalidCredential(
            "apiBaseUrl is required".to_string(),
        ));
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| {
        ChainstreamError::InvalidCredential(format!("apiBaseUrl '{raw}' is not a valid URL: {e}"))
    })?;
    url.set_fragment(None);
    url.set_query(None);
    let normalized = format!("{}{}", url.origin().ascii_serialization(), url.path());
    Ok(normalized.trim_end_matches('/').to_string())
}

/// Versioned endpoint URL for a resource path.
pub fn resource_url(base_url: &str, resource: &str) -> String {
    format!("{}/v1/{}", base_url, resource.trim_start_matches('/'))
}

/// Send `spec` and return the decoded JSON response.
///
/// `uri` replaces the computed `{apiBaseUrl}/v1/{path}` URL when given.
/// An empty body or query is left off the request entirely.
#[instrument(skip(ctx, spec), fields(method = spec.method.as_str(), path = %spec.path))]
pub async fn api_request(
    ctx: &ExecutionContext,
    spec: &RequestSpec,
    uri: Option<&str>,
) -> Result<Value, ChainstreamError> {
    let url = match uri {
        Some(uri) => uri.to_string(),
        None => {
            let data = ctx.get_credentials(CREDENTIAL_NAME).await?;
            let credential = ChainstreamCredential::from_data(&data)?;
            resource_url(&normalize_base_url(&credential.api_base_url)?, &spec.path)
        }
    };

    let mut request = HttpRequest::new(spec.method, url);
    if !spec.query.is_empty() {
        request = request.with_query(spec.query.clone());
    }
    if !spec.body.is_empty() {
        request = request.with_body(Value::Object(spec.body.clone()));
    }

    debug!("sending {} {}", request.method.as_str(), request.url);
    let response = ctx
        .http_request_with_authentication(&ChainstreamApi, request)
        .await?;
    Ok(response)
}

/// Options for the chain picker, from `GET /v1/blockchain`.
///
/// Entries without a symbol are skipped; a non-array answer yields nothing.
pub async fn load_chains(ctx: &ExecutionContext) -> Result<Vec<ChainOption>, ChainstreamError> {
    let response = api_request(ctx, &RequestSpec::get("blockchain"), None).await?;
    let Value::Array(chains) = response else {
        return Ok(Vec::new());
    };

    let options = chains
        .iter()
        .filter_map(|chain| {
            let symbol = chain
                .get("symbol")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
                .filter(|s| !s.is_empty())?;
            let name = chain
                .get("name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| symbol.clone());
            Some(ChainOption {
                name,
                value: symbol,
            })
        })
        .collect();
    Ok(options)
}

/// Check the configured credential by listing chains.
pub async fn test_credentials(ctx: &ExecutionContext) -> Result<(), ChainstreamError> {
    api_request(ctx, &RequestSpec::get("blockchain"), None).await?;
    Ok(())
}
