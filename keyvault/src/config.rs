//! Sample configuration.
//!
//! Settings are read once at startup and passed by reference to the clients;
//! nothing else in the crate reads the environment.

use std::time::Duration;

use rust_common::{HttpConfig, RetryConfig, RetryPolicy};
use secrecy::SecretString;

use crate::error::{KeyVaultError, KeyVaultResult};
use crate::models::Vault;

/// Default management-plane endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Key vault sample configuration.
#[derive(Debug, Clone)]
pub struct KeyVaultSettings {
    /// Directory (tenant) id
    pub tenant_id: String,
    /// Application (client) id
    pub client_id: String,
    /// Application secret
    pub client_secret: SecretString,
    /// Object id granted the vault access policy
    pub principal_object_id: String,
    /// Subscription holding the vault
    pub subscription_id: String,
    /// Resource group holding the vault
    pub resource_group: String,
    /// Vault name
    pub vault_name: String,
    /// Vault region
    pub vault_location: String,
    /// Storage account passed through to callers, never used here
    pub storage_account_name: Option<String>,
    /// Storage account key passed through to callers, never used here
    pub storage_account_key: Option<SecretString>,
    /// Management-plane base URL
    pub management_endpoint: String,
    /// Management-plane API version
    pub management_api_version: String,
    /// Data-plane base URL override; derived from the vault when unset
    pub vault_endpoint: Option<String>,
    /// DNS suffix used to derive the data-plane URL
    pub vault_dns_suffix: String,
    /// Data-plane API version
    pub data_api_version: String,
    /// Retry parameters shared by every call
    pub retry: RetryConfig,
    /// First delay while waiting for provisioning
    pub poll_interval: Duration,
    /// Maximum provisioning polls
    pub poll_attempts: u32,
    /// HTTP client settings
    pub http: HttpConfig,
}

impl KeyVaultSettings {
    /// Create settings with defaults for everything but the identifiers.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        vault_name: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: String::new(),
            client_secret: SecretString::from(String::new()),
            principal_object_id: String::new(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            vault_name: vault_name.into(),
            vault_location: "westus".to_string(),
            storage_account_name: None,
            storage_account_key: None,
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            management_api_version: "2023-07-01".to_string(),
            vault_endpoint: None,
            vault_dns_suffix: "vault.azure.net".to_string(),
            data_api_version: "7.4".to_string(),
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(2),
            poll_attempts: 10,
            http: HttpConfig::default(),
        }
    }

    /// Load configuration from `.env` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env() -> KeyVaultResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> KeyVaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| KeyVaultError::invalid_config(format!("{name} is required")))
        };

        let mut settings = Self::new(
            required("TENANT_ID")?,
            required("SUBSCRIPTION_ID")?,
            required("RESOURCE_GROUP")?,
            required("VAULT_NAME")?,
        );
        validate_vault_name(&settings.vault_name)?;
        settings.client_id = required("CLIENT_ID")?;
        settings.client_secret = SecretString::from(required("CLIENT_SECRET")?);
        settings.principal_object_id =
            lookup("PRINCIPAL_OBJECT_ID").unwrap_or_else(|| settings.client_id.clone());

        if let Some(location) = lookup("VAULT_LOCATION") {
            settings.vault_location = location;
        }
        settings.storage_account_name = lookup("STORAGE_ACCOUNT_NAME");
        settings.storage_account_key = lookup("STORAGE_ACCOUNT_KEY").map(SecretString::from);
        if let Some(endpoint) = lookup("MANAGEMENT_ENDPOINT") {
            settings.management_endpoint = endpoint;
        }
        settings.vault_endpoint = lookup("VAULT_ENDPOINT");

        let initial_backoff = parse_var(&lookup, "RETRY_INITIAL_BACKOFF_SECS", 1u64)?;
        let max_attempts = parse_var(&lookup, "RETRY_MAX_ATTEMPTS", 3u32)?;
        settings.retry = RetryConfig::default()
            .with_initial_backoff(Duration::from_secs(initial_backoff))
            .with_max_attempts(max_attempts);
        settings.poll_interval = Duration::from_secs(parse_var(&lookup, "POLL_INTERVAL_SECS", 2u64)?);
        settings.poll_attempts = parse_var(&lookup, "POLL_MAX_ATTEMPTS", 10u32)?;
        if settings.poll_attempts == 0 {
            return Err(KeyVaultError::invalid_config("POLL_MAX_ATTEMPTS must be at least 1"));
        }
        let timeout = Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30u64)?);
        settings.http.timeout = timeout;

        settings.retry_policy()?;
        Ok(settings)
    }

    /// Validated retry policy for ordinary calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry parameters are inconsistent.
    pub fn retry_policy(&self) -> KeyVaultResult<RetryPolicy> {
        Ok(RetryPolicy::new(self.retry.clone())?)
    }

    /// Data-plane base URL for a vault.
    ///
    /// Prefers the configured override, then the vault's reported URI, then
    /// `https://{name}.{suffix}`.
    #[must_use]
    pub fn vault_uri(&self, vault: &Vault) -> String {
        self.vault_endpoint
            .clone()
            .or_else(|| vault.properties.vault_uri.clone())
            .unwrap_or_else(|| format!("https://{}.{}", vault.name, self.vault_dns_suffix))
            .trim_end_matches('/')
            .to_string()
    }
}

/// Vault names are 3-24 ASCII letters, digits and single dashes, starting
/// with a letter and not ending with a dash.
///
/// # Errors
///
/// Returns [`KeyVaultError::InvalidName`] for any other name.
pub fn validate_vault_name(name: &str) -> KeyVaultResult<()> {
    let bytes = name.as_bytes();
    let valid = (3..=24).contains(&bytes.len())
        && bytes[0].is_ascii_alphabetic()
        && bytes[bytes.len() - 1] != b'-'
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        && !name.contains("--");
    if valid {
        Ok(())
    } else {
        Err(KeyVaultError::InvalidName(name.to_string()))
    }
}

/// Parse a variable with a default value.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> KeyVaultResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| KeyVaultError::invalid_config(format!("Invalid {name}: {e}"))),
        None => Ok(default),
    }
}
