//! Data-plane client for secret and key operations.

use std::sync::Arc;

use reqwest::{Client, Method};
use rust_common::{Outcome, RetryPolicy, build_http_client, check_status};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::KeyVaultSettings;
use crate::credential::{TokenCredential, VAULT_SCOPE};
use crate::error::{KeyVaultError, KeyVaultResult};
use crate::models::{Key, KeyBundle, KeyType, Secret, SecretBundle};

/// Data-plane statuses that fail fast.
pub const DATA_PLANE_ABORT_ON: [u16; 5] = [400, 401, 403, 404, 409];

/// Client for one vault's secrets and keys.
///
/// Every call runs under the client's retry policy.
pub struct DataClient {
    http: Client,
    credential: Arc<dyn TokenCredential>,
    vault_uri: String,
    api_version: String,
    policy: RetryPolicy,
}

impl DataClient {
    /// Create a client for the vault at `vault_uri`.
    ///
    /// The retry policy is the configured one with client errors aborting.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the retry
    /// parameters are inconsistent.
    pub fn new(
        vault_uri: &str,
        settings: &KeyVaultSettings,
        credential: Arc<dyn TokenCredential>,
    ) -> KeyVaultResult<Self> {
        let policy = RetryPolicy::new(settings.retry.clone().with_abort_on(DATA_PLANE_ABORT_ON))?;
        Ok(Self {
            http: build_http_client(&settings.http)?,
            credential,
            vault_uri: vault_uri.trim_end_matches('/').to_string(),
            api_version: settings.data_api_version.clone(),
            policy,
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Base URL of the vault.
    #[must_use]
    pub fn vault_uri(&self) -> &str {
        &self.vault_uri
    }

    /// Store a secret value, creating a new version.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid name, an abort status, exhausted
    /// retries or a transport failure.
    #[instrument(skip(self, value))]
    pub async fn set_secret(&self, name: &str, value: &SecretString) -> KeyVaultResult<Secret> {
        validate_name(name)?;
        let body = serde_json::json!({ "value": value.expose_secret() });
        let bundle: SecretBundle = self
            .call("set_secret", Method::PUT, &format!("secrets/{name}"), Some(body))
            .await?;
        Ok(bundle.into())
    }

    /// Read the latest version of a secret.
    ///
    /// # Errors
    ///
    /// As [`DataClient::set_secret`]; a missing secret is a 404 status error.
    #[instrument(skip(self))]
    pub async fn get_secret(&self, name: &str) -> KeyVaultResult<Secret> {
        validate_name(name)?;
        let bundle: SecretBundle = self
            .call("get_secret", Method::GET, &format!("secrets/{name}"), None)
            .await?;
        Ok(bundle.into())
    }

    /// Delete a secret.
    ///
    /// # Errors
    ///
    /// As [`DataClient::set_secret`].
    #[instrument(skip(self))]
    pub async fn delete_secret(&self, name: &str) -> KeyVaultResult<()> {
        validate_name(name)?;
        self.call::<serde_json::Value>("delete_secret", Method::DELETE, &format!("secrets/{name}"), None)
            .await?;
        Ok(())
    }

    /// Create a key.
    ///
    /// # Errors
    ///
    /// As [`DataClient::set_secret`].
    #[instrument(skip(self))]
    pub async fn create_key(&self, name: &str, key_type: KeyType) -> KeyVaultResult<Key> {
        validate_name(name)?;
        let bundle: KeyBundle = self
            .call(
                "create_key",
                Method::POST,
                &format!("keys/{name}/create"),
                Some(key_type.request_body()),
            )
            .await?;
        Ok(bundle.into())
    }

    /// Read the latest version of a key.
    ///
    /// # Errors
    ///
    /// As [`DataClient::set_secret`].
    #[instrument(skip(self))]
    pub async fn get_key(&self, name: &str) -> KeyVaultResult<Key> {
        validate_name(name)?;
        let bundle: KeyBundle = self
            .call("get_key", Method::GET, &format!("keys/{name}"), None)
            .await?;
        Ok(bundle.into())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> KeyVaultResult<T> {
        let url = format!("{}/{}?api-version={}", self.vault_uri, path, self.api_version);
        let (url, method, body) = (&url, &method, body.as_ref());

        let outcome = self
            .policy
            .execute(operation, move || self.send_once(method.clone(), url, body))
            .await?;
        require_response(operation, outcome)
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> KeyVaultResult<T> {
        let token = self.credential.get_token(VAULT_SCOPE).await?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token.secret())
            .header("x-ms-client-request-id", Uuid::new_v4().to_string());
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = check_status(request.send().await?).await?;
        debug!(status = response.status().as_u16(), "Data-plane call succeeded");
        Ok(response.json().await?)
    }
}

/// Turn an executor outcome into the response or an error naming why none exists.
///
/// # Errors
///
/// Returns [`KeyVaultError::NoResponse`] or [`KeyVaultError::RetriesExhausted`]
/// when no attempt succeeded.
pub fn require_response<T>(operation: &str, outcome: Outcome<T>) -> KeyVaultResult<T> {
    match outcome {
        Outcome::Success(response) => Ok(response),
        Outcome::Continued { status } => Err(KeyVaultError::NoResponse {
            operation: operation.to_string(),
            status,
        }),
        Outcome::Exhausted {
            attempts,
            last_status,
        } => Err(KeyVaultError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            last_status,
        }),
    }
}

/// Object names are 1-127 ASCII letters, digits and dashes.
fn validate_name(name: &str) -> KeyVaultResult<()> {
    let valid = (1..=127).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(KeyVaultError::InvalidName(name.to_string()))
    }
}
