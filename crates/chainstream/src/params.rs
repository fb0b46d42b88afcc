//! Parameter resolution for path identifiers.
//!
//! Older node configurations name the same field differently (`chainId`,
//! `chain_id`, `network`…). A [`ParameterSearch`] is the ordered list of
//! lookups that still resolves them: exact names first, then name patterns.
//! Every lookup is a plain read through [`Parameters`]; nothing else is
//! inspected.

use nodes::Parameters;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, trace};

use crate::ChainstreamError;

/// Chain codes whose display name differs from the code sent upstream.
const CHAIN_ALIASES: &[(&str, &str)] = &[("solana", "sol")];

/// Prioritised lookups for one semantic field.
#[derive(Debug, Clone)]
pub struct ParameterSearch {
    /// Human name used in errors, e.g. "chain ID".
    pub field: &'static str,
    pub exact: Vec<&'static str>,
    pub patterns: Vec<Regex>,
}

impl ParameterSearch {
    /// Build a search from literal names and patterns. Patterns match
    /// case-insensitively; one that does not compile is logged and skipped.
    pub fn new(field: &'static str, exact: &[&'static str], patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!("dropping invalid {} pattern '{}': {}", field, p, e);
                    None
                }
            })
            .collect();
        Self {
            field,
            exact: exact.to_vec(),
            patterns,
        }
    }

    /// First candidate value that is a non-empty string after trimming.
    ///
    /// Exact names are read in order; a read failure moves on to the next.
    /// Each pattern picks the first defined parameter name it matches and
    /// reads that one.
    pub fn resolve(&self, params: &dyn Parameters, item: usize) -> Result<String, ChainstreamError> {
        self.find(params, item, |value| Some(value.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but parses the value as a base-10
    /// integer. A value that does not parse falls through to the next candidate.
    pub fn resolve_number(&self, params: &dyn Parameters, item: usize) -> Result<i64, ChainstreamError> {
        self.find(params, item, |value| value.parse::<i64>().ok())
    }

    fn find<T>(
        &self,
        params: &dyn Parameters,
        item: usize,
        accept: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ChainstreamError> {
        for name in &self.exact {
            if let Some(found) = read_trimmed(params, name, item).and_then(|v| accept(&v)) {
                trace!("{} resolved from '{}'", self.field, name);
                return Ok(found);
            }
        }

        let names = params.names();
        for pattern in &self.patterns {
            let Some(name) = names.iter().find(|n| pattern.is_match(n)) else {
                continue;
            };
            if let Some(found) = read_trimmed(params, name, item).and_then(|v| accept(&v)) {
                trace!("{} resolved from '{}' via /{}/", self.field, name, pattern);
                return Ok(found);
            }
        }

        Err(self.not_found(&names))
    }

    fn not_found(&self, available: &[String]) -> ChainstreamError {
        let tried = self
            .exact
            .iter()
            .map(|n| n.to_string())
            .chain(self.patterns.iter().map(|p| format!("/{}/", p.as_str())))
            .collect::<Vec<_>>()
            .join(", ");
        let available = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };
        ChainstreamError::ParameterNotFound {
            field: self.field,
            tried,
            available,
        }
    }
}

fn read_trimmed(params: &dyn Parameters, name: &str, item: usize) -> Option<String> {
    match params.get(name, item) {
        Ok(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Built-in searches
// ---------------------------------------------------------------------------

pub static CHAIN_ID: Lazy<ParameterSearch> = Lazy::new(|| {
    ParameterSearch::new(
        "chain ID",
        &["chainId", "chain", "Chain_ID", "chain_id", "network"],
        &["chain", "network", "blockchain"],
    )
});

pub static TOKEN_ADDRESS: Lazy<ParameterSearch> = Lazy::new(|| {
    ParameterSearch::new(
        "token address",
        &["tokenAddress", "Token_Address", "token", "contractAddress"],
        &["token", "address", "contract"],
    )
});

pub static WALLET_ADDRESS: Lazy<ParameterSearch> = Lazy::new(|| {
    ParameterSearch::new(
        "wallet address",
        &["walletAddress", "Wallet_Address", "wallet", "owner"],
        &["wallet", "owner"],
    )
});

/// Chain code for `item`: resolved, lower-cased, with the one known alias applied.
pub fn chain_id(params: &dyn Parameters, item: usize) -> Result<String, ChainstreamError> {
    CHAIN_ID.resolve(params, item).map(|v| normalize_chain_id(&v))
}

pub fn token_address(params: &dyn Parameters, item: usize) -> Result<String, ChainstreamError> {
    TOKEN_ADDRESS.resolve(params, item)
}

pub fn wallet_address(params: &dyn Parameters, item: usize) -> Result<String, ChainstreamError> {
    WALLET_ADDRESS.resolve(params, item)
}

pub fn normalize_chain_id(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    CHAIN_ALIASES
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, code)| code.to_string())
        .unwrap_or(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::memory::MemoryParameters;
    use serde_json::json;

    #[test]
    fn builtin_patterns_all_compile() {
        assert_eq!(CHAIN_ID.patterns.len(), 3);
        assert_eq!(TOKEN_ADDRESS.patterns.len(), 3);
        assert_eq!(WALLET_ADDRESS.patterns.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let search = ParameterSearch::new("chain ID", &["chainId"], &["chain", "net(work"]);
        assert_eq!(search.patterns.len(), 1);
    }

    #[test]
    fn exact_name_beats_earlier_declared_pattern_match() {
        // `selectedNetwork` is declared first and matches /network/, but the
        // exact candidate `chainId` must still win.
        let params = MemoryParameters::new()
            .with("selectedNetwork", json!("bsc"))
            .with("chainId", json!("eth"));
        assert_eq!(CHAIN_ID.resolve(&params, 0).unwrap(), "eth");
    }

    #[test]
    fn exact_names_are_tried_in_order() {
        let params = MemoryParameters::new()
            .with("chain_id", json!("base"))
            .with("chain", json!("eth"));
        assert_eq!(CHAIN_ID.resolve(&params, 0).unwrap(), "eth");
    }

    #[test]
    fn blank_values_fall_through_to_later_candidates() {
        let params = MemoryParameters::new()
            .with("chainId", json!("   "))
            .with("network", json!(" sol "));
        assert_eq!(CHAIN_ID.resolve(&params, 0).unwrap(), "sol");
    }

    #[test]
    fn non_string_values_are_not_accepted() {
        let params = MemoryParameters::new()
            .with("chainId", json!(56))
            .with("chain", json!("bsc"));
        assert_eq!(CHAIN_ID.resolve(&params, 0).unwrap(), "bsc");
    }

    #[test]
    fn pattern_matches_case_insensitively() {
        let params = MemoryParameters::new()
            .with("resource", json!("token"))
            .with("selectedBlockchain", json!("eth"));
        assert_eq!(CHAIN_ID.resolve(&params, 0).unwrap(), "eth");
    }

    #[test]
    fn pattern_only_reads_the_first_matching_name() {
        let params = MemoryParameters::new()
            .with("myWalletLabel", json!(""))
            .with("walletOwnerAddress", json!("W9"));
        // /wallet/ picks `myWalletLabel` (empty) and stops; /owner/ then
        // finds `walletOwnerAddress`.
        assert_eq!(WALLET_ADDRESS.resolve(&params, 0).unwrap(), "W9");
    }

    #[test]
    fn not_found_names_field_and_available_parameters() {
        let params = MemoryParameters::new().with("resource", json!("token"));
        let err = TOKEN_ADDRESS.resolve(&params, 0).unwrap_err();
        match err {
            ChainstreamError::ParameterNotFound { field, tried, available } => {
                assert_eq!(field, "token address");
                assert!(tried.contains("contractAddress"));
                assert!(tried.contains("/(?i)contract/"));
                assert_eq!(available, "resource");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn resolution_is_per_item() {
        let params = MemoryParameters::new()
            .with("tokenAddress", json!("0xaaa"))
            .with_item(2, "tokenAddress", json!(""));
        assert_eq!(TOKEN_ADDRESS.resolve(&params, 0).unwrap(), "0xaaa");
        assert!(TOKEN_ADDRESS.resolve(&params, 2).is_err());
    }

    #[test]
    fn numeric_resolution_skips_unparseable_candidates() {
        let search = ParameterSearch::new("limit", &["limit", "pageSize"], &["size"]);
        let params = MemoryParameters::new()
            .with("limit", json!("lots"))
            .with("pageSize", json!(" 25 "));
        assert_eq!(search.resolve_number(&params, 0).unwrap(), 25);

        let params = MemoryParameters::new().with("limit", json!("1e3"));
        assert!(search.resolve_number(&params, 0).is_err());
    }

    #[test]
    fn solana_alias_is_the_only_rewrite() {
        assert_eq!(normalize_chain_id("Solana"), "sol");
        assert_eq!(normalize_chain_id("  SOLANA "), "sol");
        assert_eq!(normalize_chain_id(" ETH "), "eth");
        assert_eq!(normalize_chain_id("Ethereum"), "ethereum");
    }

    #[test]
    fn chain_id_applies_normalisation() {
        let params = MemoryParameters::new().with("chainId", json!("Solana"));
        assert_eq!(chain_id(&params, 0).unwrap(), "sol");
    }
}
