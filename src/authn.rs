use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

use crate::config::TokenConfig;
use crate::error::GatewayError;

/// Immutable token → `{label, rpm, rpd}` mapping, built once at startup
/// and shared read-only across every request — ported from
/// `app/auth.py::TokenRegistry`.
pub struct TokenRegistry {
	tokens: HashMap<String, TokenConfig>,
}

impl TokenRegistry {
	pub fn new(tokens: Vec<TokenConfig>) -> Self {
		let tokens = tokens.into_iter().map(|t| (t.token.clone(), t)).collect();
		Self { tokens }
	}

	pub fn get(&self, token: &str) -> Option<&TokenConfig> {
		self.tokens.get(token)
	}

	/// Extracts the bearer token from an `Authorization` header value and
	/// resolves it, producing the exact authentication errors spec §4.1
	/// step 1 calls for.
	pub fn authenticate(&self, authorization: Option<&str>) -> Result<&TokenConfig, GatewayError> {
		let token = extract_bearer(authorization).ok_or_else(GatewayError::missing_token)?;
		self.get(token.expose_secret()).ok_or_else(GatewayError::invalid_token)
	}
}

/// Case-insensitive `bearer ` scheme match, trimmed — spec §4.1 step 1.
fn extract_bearer(header: Option<&str>) -> Option<SecretString> {
	let header = header?;
	let lower = header.to_ascii_lowercase();
	if !lower.starts_with("bearer ") {
		return None;
	}
	let token = header[7..].trim();
	if token.is_empty() {
		return None;
	}
	Some(SecretString::new(token.into()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> TokenRegistry {
		TokenRegistry::new(vec![TokenConfig {
			token: "test-token".to_string(),
			label: "test".to_string(),
			rpm: 5,
			rpd: 10,
		}])
	}

	#[test]
	fn missing_header_is_missing_token() {
		let err = registry().authenticate(None).unwrap_err();
		assert_eq!(err.kind, crate::error::ErrorKind::Authentication);
	}

	#[test]
	fn wrong_token_is_invalid_token() {
		let err = registry().authenticate(Some("Bearer wrong")).unwrap_err();
		assert_eq!(err.kind, crate::error::ErrorKind::Authentication);
	}

	#[test]
	fn case_insensitive_scheme_matches() {
		let reg = registry();
		assert!(reg.authenticate(Some("BEARER test-token")).is_ok());
		assert!(reg.authenticate(Some("bearer test-token")).is_ok());
	}

	#[test]
	fn valid_token_resolves() {
		let reg = registry();
		let resolved = reg.authenticate(Some("Bearer test-token")).unwrap();
		assert_eq!(resolved.label, "test");
	}
}
