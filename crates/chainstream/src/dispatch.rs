//! Request dispatch: (resource, operation) → [`RequestSpec`].
//!
//! The routing table is data. Each entry names the HTTP method, a path
//! template and the query parameters it forwards. Path placeholders are
//! resolved through [`crate::params`]; query parameters are read by exact
//! name and dropped when undefined, null or empty.

use std::collections::BTreeMap;

use nodes::{HttpMethod, Parameters};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::models::RequestSpec;
use crate::params;
use crate::ChainstreamError;

// ---------------------------------------------------------------------------
// Path parameters
// ---------------------------------------------------------------------------

/// Identifiers that can appear in a path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathParam {
    Chain,
    Token,
    Wallet,
}

impl PathParam {
    /// Resolution order when a template uses several placeholders.
    pub const ALL: [PathParam; 3] = [PathParam::Chain, PathParam::Token, PathParam::Wallet];

    pub fn placeholder(&self) -> &'static str {
        match self {
            PathParam::Chain => "{chain}",
            PathParam::Token => "{token}",
            PathParam::Wallet => "{wallet}",
        }
    }

    fn resolve(&self, params: &dyn Parameters, item: usize) -> Result<String, ChainstreamError> {
        match self {
            PathParam::Chain => params::chain_id(params, item),
            PathParam::Token => params::token_address(params, item),
            PathParam::Wallet => params::wallet_address(params, item),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation table
// ---------------------------------------------------------------------------

/// How to build the request for one (resource, operation) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub method: HttpMethod,
    /// Path relative to `/v1/`, with `{chain}`, `{token}`, `{wallet}` placeholders.
    pub path: &'static str,
    /// Optional query parameters, read by exact name.
    pub query: &'static [&'static str],
}

impl OperationSpec {
    pub const fn get(path: &'static str, query: &'static [&'static str]) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            query,
        }
    }
}

const PAGING: &[&str] = &["cursor", "direction", "limit"];
const TRADE_FILTERS: &[&str] = &[
    "cursor",
    "tokenAddress",
    "direction",
    "limit",
    "walletAddress",
    "poolAddress",
    "beforeTimestamp",
    "afterTimestamp",
    "beforeBlockHeight",
    "afterBlockHeight",
    "type",
];

const BUILTIN: &[(&str, &str, OperationSpec)] = &[
    // token
    ("token", "get", OperationSpec::get("token/{chain}/{token}", &[])),
    ("token", "detail", OperationSpec::get("token/{chain}/{token}", &[])),
    ("token", "getMany", OperationSpec::get("token/{chain}/multi", &["tokenAddresses"])),
    ("token", "search", OperationSpec::get("token/search", &["chains", "q", "limit"])),
    ("token", "metadata", OperationSpec::get("token/{chain}/{token}/metadata", &[])),
    ("token", "liquidity", OperationSpec::get("token/{chain}/{token}/liquidity", &[])),
    ("token", "stats", OperationSpec::get("token/{chain}/{token}/stats", &[])),
    ("token", "holders", OperationSpec::get("token/{chain}/{token}/holders", &["limit", "cursor", "direction"])),
    ("token", "candles", OperationSpec::get("token/{chain}/{token}/candles", &["resolution", "from", "to", "limit"])),
    ("token", "topHolders", OperationSpec::get("token/{chain}/{token}/topHolders", &[])),
    ("token", "marketData", OperationSpec::get("token/{chain}/{token}/marketData", &[])),
    ("token", "prices", OperationSpec::get("token/{chain}/{token}/prices", PAGING)),
    ("token", "price", OperationSpec::get("token/{chain}/{token}/price", &["timestamp"])),
    ("token", "creation", OperationSpec::get("token/{chain}/{token}/creation", &[])),
    ("token", "mintAndBurn", OperationSpec::get("token/{chain}/{token}/mintAndBurn", &["cursor", "limit", "direction", "type"])),
    ("token", "security", OperationSpec::get("token/{chain}/{token}/security", &[])),
    // trade
    ("trade", "trade", OperationSpec::get("trade/{chain}", TRADE_FILTERS)),
    ("trade", "activity", OperationSpec::get("trade/{chain}/activities", TRADE_FILTERS)),
    (
        "trade",
        "top-traders",
        OperationSpec::get(
            "trade/{chain}/top-traders",
            &["cursor", "limit", "direction", "tokenAddress", "timeFrame", "sortType", "sortBy"],
        ),
    ),
    (
        "trade",
        "gainers-losers",
        OperationSpec::get(
            "trade/{chain}/gainers-losers",
            &["cursor", "limit", "direction", "type", "sortBy", "sortType"],
        ),
    ),
    // wallet
    (
        "wallet",
        "balance",
        OperationSpec::get("wallet/{chain}/{wallet}/balance", &["tokenAddress", "limit", "cursor", "direction"]),
    ),
    ("wallet", "pnl", OperationSpec::get("wallet/{chain}/{wallet}/pnl", &["tokenAddress"])),
    ("wallet", "stats", OperationSpec::get("wallet/{chain}/{wallet}/stats", &[])),
];

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Two-level routing table: resource → operation → [`OperationSpec`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    resources: BTreeMap<String, BTreeMap<String, OperationSpec>>,
}

impl Default for Dispatcher {
    /// The built-in Chainstream table.
    fn default() -> Self {
        let mut dispatcher = Self::empty();
        for (resource, operation, spec) in BUILTIN {
            dispatcher.register(resource, operation, *spec);
        }
        dispatcher
    }
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Add or replace the handler for `resource`/`operation`.
    pub fn register(&mut self, resource: &str, operation: &str, spec: OperationSpec) -> &mut Self {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .insert(operation.to_string(), spec);
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn operations(&self, resource: &str) -> impl Iterator<Item = &str> {
        self.resources
            .get(resource)
            .into_iter()
            .flat_map(|ops| ops.keys().map(String::as_str))
    }

    pub fn lookup(&self, resource: &str, operation: &str) -> Result<&OperationSpec, ChainstreamError> {
        let operations = self
            .resources
            .get(resource)
            .ok_or_else(|| ChainstreamError::UnsupportedResource(resource.to_string()))?;
        operations
            .get(operation)
            .ok_or_else(|| ChainstreamError::UnsupportedOperation {
                resource: resource.to_string(),
                operation: operation.to_string(),
            })
    }

    /// Build the request for one item.
    ///
    /// # Errors
    /// - [`ChainstreamError::UnsupportedResource`] / [`ChainstreamError::UnsupportedOperation`]
    ///   when the pair is not registered.
    /// - [`ChainstreamError::ParameterNotFound`] when a path identifier cannot be resolved.
    #[instrument(skip(self, params))]
    pub fn build_request(
        &self,
        resource: &str,
        operation: &str,
        params: &dyn Parameters,
        item: usize,
    ) -> Result<RequestSpec, ChainstreamError> {
        let spec = self.lookup(resource, operation)?;

        let mut path = spec.path.to_string();
        for param in PathParam::ALL {
            if path.contains(param.placeholder()) {
                let value = param.resolve(params, item)?;
                path = path.replace(param.placeholder(), &value);
            }
        }

        let query = collect_query(params, item, spec.query);
        debug!("built {} {} with {} query fields", spec.method.as_str(), path, query.len());
        Ok(RequestSpec::new(spec.method, path).with_query(query))
    }
}

/// Read `names` by exact name, keeping only values worth sending.
///
/// Undefined, null and empty-string values are dropped. Arrays of scalars
/// are sent comma-separated; objects are never sent.
pub fn collect_query(params: &dyn Parameters, item: usize, names: &[&str]) -> Map<String, Value> {
    let mut query = Map::new();
    for name in names {
        let Ok(value) = params.get(name, item) else {
            continue;
        };
        if let Some(value) = query_value(value) {
            query.insert(name.to_string(), value);
        }
    }
    query
}

fn query_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Object(_) => None,
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(Value::String(joined))
        }
        scalar => Some(scalar),
    }
}
