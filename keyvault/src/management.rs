//! Management-plane client for vault lifecycle calls.
//!
//! Each method performs exactly one HTTP request. Retrying is left to the
//! caller's [`rust_common::RetryPolicy`], so a missing vault surfaces as a
//! 404 status failure the caller can classify.

use std::sync::Arc;

use reqwest::{Client, Method};
use rust_common::{build_http_client, check_status};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{KeyVaultSettings, validate_vault_name};
use crate::credential::{MANAGEMENT_SCOPE, TokenCredential};
use crate::error::KeyVaultResult;
use crate::models::{CreateVaultRequest, Vault};

/// Client for vault create/read calls.
pub struct ManagementClient {
    http: Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    subscription_id: String,
    resource_group: String,
    api_version: String,
}

impl ManagementClient {
    /// Create a client for the subscription and resource group in `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        settings: &KeyVaultSettings,
        credential: Arc<dyn TokenCredential>,
    ) -> KeyVaultResult<Self> {
        Ok(Self {
            http: build_http_client(&settings.http)?,
            credential,
            endpoint: settings.management_endpoint.trim_end_matches('/').to_string(),
            subscription_id: settings.subscription_id.clone(),
            resource_group: settings.resource_group.clone(),
            api_version: settings.management_api_version.clone(),
        })
    }

    fn vault_url(&self, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.KeyVault/vaults/{}?api-version={}",
            self.endpoint, self.subscription_id, self.resource_group, name, self.api_version
        )
    }

    /// Fetch a vault by name.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::KeyVaultError::InvalidName`] before sending when the
    /// name is not a valid vault name, with a 404 status error when the vault
    /// does not exist, and with the response status for any other non-2xx
    /// answer.
    #[instrument(skip(self))]
    pub async fn get_vault(&self, name: &str) -> KeyVaultResult<Vault> {
        validate_vault_name(name)?;
        debug!("Fetching vault");
        self.send(Method::GET, name, None).await
    }

    /// Create a vault, or update it if it exists.
    ///
    /// # Errors
    ///
    /// Fails on an invalid vault name, and with the response status for any
    /// non-2xx answer.
    #[instrument(skip(self, properties))]
    pub async fn create_or_update_vault(
        &self,
        name: &str,
        location: &str,
        properties: &serde_json::Value,
    ) -> KeyVaultResult<Vault> {
        validate_vault_name(name)?;
        let body = serde_json::to_value(CreateVaultRequest {
            location,
            properties,
        })?;
        let vault: Vault = self.send(Method::PUT, name, Some(body)).await?;
        info!(state = vault.provisioning_state(), "Vault create-or-update accepted");
        Ok(vault)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        name: &str,
        body: Option<serde_json::Value>,
    ) -> KeyVaultResult<T> {
        let token = self.credential.get_token(MANAGEMENT_SCOPE).await?;

        let mut request = self
            .http
            .request(method, self.vault_url(name))
            .bearer_auth(token.secret())
            .header("x-ms-client-request-id", Uuid::new_v4().to_string());
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}
