//! Access token seam.
//!
//! Token acquisition belongs to the identity provider. Clients only ask a
//! [`TokenCredential`] for a bearer token per scope.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{KeyVaultError, KeyVaultResult};

/// Scope of management-plane tokens.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Scope of data-plane tokens.
pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Bearer token with its expiry.
#[derive(Clone)]
pub struct AccessToken {
    /// Token value
    pub token: SecretString,
    /// Expiry instant
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    /// Create a token.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_on,
        }
    }

    /// Whether the token expires within `skew` of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_on - skew <= now
    }

    /// Raw token for an `Authorization: Bearer` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> KeyVaultResult<AccessToken>;
}

/// Credential serving tokens acquired ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenCredential {
    tokens: HashMap<String, AccessToken>,
}

impl StaticTokenCredential {
    /// Refuse tokens this close to expiry.
    const EXPIRY_SKEW_SECS: i64 = 60;

    /// Create an empty credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a scope.
    #[must_use]
    pub fn with_token(mut self, scope: impl Into<String>, token: AccessToken) -> Self {
        self.tokens.insert(scope.into(), token);
        self
    }

    /// Read `MANAGEMENT_ACCESS_TOKEN` and `VAULT_ACCESS_TOKEN`.
    ///
    /// Tokens are assumed valid for `ACCESS_TOKEN_TTL_SECS` (default 3600)
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns an error if neither token is set or the TTL is invalid.
    pub fn from_lookup<F>(lookup: F) -> KeyVaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ttl = match lookup("ACCESS_TOKEN_TTL_SECS") {
            Some(v) => v
                .parse::<i64>()
                .map_err(|e| KeyVaultError::invalid_config(format!("Invalid ACCESS_TOKEN_TTL_SECS: {e}")))?,
            None => 3600,
        };
        if ttl <= 0 {
            return Err(KeyVaultError::invalid_config(
                "ACCESS_TOKEN_TTL_SECS must be positive",
            ));
        }
        let expires_on = Duration::try_seconds(ttl)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| KeyVaultError::invalid_config("ACCESS_TOKEN_TTL_SECS is out of range"))?;

        let mut credential = Self::new();
        for (var, scope) in [
            ("MANAGEMENT_ACCESS_TOKEN", MANAGEMENT_SCOPE),
            ("VAULT_ACCESS_TOKEN", VAULT_SCOPE),
        ] {
            if let Some(token) = lookup(var) {
                credential = credential.with_token(scope, AccessToken::new(token, expires_on));
            }
        }

        if credential.tokens.is_empty() {
            return Err(KeyVaultError::invalid_config(
                "MANAGEMENT_ACCESS_TOKEN or VAULT_ACCESS_TOKEN is required",
            ));
        }
        Ok(credential)
    }

    /// Read tokens from the environment.
    ///
    /// # Errors
    ///
    /// See [`StaticTokenCredential::from_lookup`].
    pub fn from_env() -> KeyVaultResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, scope: &str) -> KeyVaultResult<AccessToken> {
        let token = self
            .tokens
            .get(scope)
            .ok_or_else(|| KeyVaultError::credential(format!("no token for scope {scope}")))?;

        if token.is_expired(Utc::now(), Duration::seconds(Self::EXPIRY_SKEW_SECS)) {
            return Err(KeyVaultError::credential(format!(
                "token for scope {scope} expired at {}",
                token.expires_on
            )));
        }
        Ok(token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_by_scope() {
        let credential = StaticTokenCredential::new().with_token(
            VAULT_SCOPE,
            AccessToken::new("vault-token", Utc::now() + Duration::hours(1)),
        );

        let token = credential.get_token(VAULT_SCOPE).await.unwrap();
        assert_eq!(token.secret(), "vault-token");

        let err = credential.get_token(MANAGEMENT_SCOPE).await.unwrap_err();
        assert!(matches!(err, KeyVaultError::Credential(_)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let credential = StaticTokenCredential::new().with_token(
            VAULT_SCOPE,
            AccessToken::new("stale", Utc::now() + Duration::seconds(30)),
        );
        tokio_test::assert_err!(credential.get_token(VAULT_SCOPE).await);
    }

    #[test]
    fn test_from_lookup_rejects_bad_ttl() {
        let overflow = i64::MAX.to_string();
        for ttl in ["0", "-60", overflow.as_str()] {
            let err = StaticTokenCredential::from_lookup(|name| match name {
                "VAULT_ACCESS_TOKEN" => Some("token".to_string()),
                "ACCESS_TOKEN_TTL_SECS" => Some(ttl.to_string()),
                _ => None,
            })
            .unwrap_err();
            assert!(matches!(err, KeyVaultError::InvalidConfig(_)), "ttl {ttl}");
        }
    }

    #[test]
    fn test_from_lookup_requires_a_token() {
        assert!(StaticTokenCredential::from_lookup(|_| None).is_err());

        let credential = StaticTokenCredential::from_lookup(|name| {
            (name == "VAULT_ACCESS_TOKEN").then(|| "t".to_string())
        })
        .unwrap();
        assert!(credential.tokens.contains_key(VAULT_SCOPE));
        assert!(!credential.tokens.contains_key(MANAGEMENT_SCOPE));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("bearer-value", Utc::now());
        assert!(!format!("{token:?}").contains("bearer-value"));
    }
}
