//! Ensure the configured vault exists and is ready.
//!
//! The flow is linear: look the vault up, create it when the lookup ends on
//! a 404, wait for provisioning to finish, then fetch the final descriptor.

use rust_common::{Outcome, RetryPolicy};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::KeyVaultSettings;
use crate::data::require_response;
use crate::error::{KeyVaultError, KeyVaultResult};
use crate::management::ManagementClient;
use crate::models::Vault;

/// Management-plane statuses that fail fast.
pub const MANAGEMENT_ABORT_ON: [u16; 4] = [400, 401, 403, 409];

/// Status reported while provisioning is still running.
const ACCEPTED: u16 = 202;

/// Minimal vault properties: standard SKU and an access policy for the
/// configured principal covering the operations this sample performs.
#[must_use]
pub fn default_vault_properties(settings: &KeyVaultSettings) -> serde_json::Value {
    json!({
        "tenantId": settings.tenant_id,
        "sku": { "family": "A", "name": "standard" },
        "accessPolicies": [{
            "tenantId": settings.tenant_id,
            "objectId": settings.principal_object_id,
            "permissions": {
                "keys": ["get", "list", "create", "delete"],
                "secrets": ["get", "list", "set", "delete"]
            }
        }]
    })
}

/// Fetch the configured vault, creating it if absent.
///
/// # Errors
///
/// Returns an error if a call aborts, retries are exhausted, provisioning
/// fails or never completes within the configured polls.
#[instrument(skip_all, fields(vault = %settings.vault_name))]
pub async fn ensure_vault(
    client: &ManagementClient,
    settings: &KeyVaultSettings,
) -> KeyVaultResult<Vault> {
    let name = settings.vault_name.as_str();
    let abort_config = settings.retry.clone().with_abort_on(MANAGEMENT_ABORT_ON);

    // All policies are validated before the first request.
    let lookup = RetryPolicy::new(abort_config.clone().with_continue_on([404]))?;
    let write = RetryPolicy::new(abort_config)?;
    let poll = poll_policy(settings)?;

    let vault = match lookup.execute("get_vault", || client.get_vault(name)).await? {
        Outcome::Success(vault) => {
            info!(state = vault.provisioning_state(), "Vault already exists");
            vault
        }
        Outcome::Continued { .. } => {
            info!(location = %settings.vault_location, "Vault not found, creating");
            let properties = default_vault_properties(settings);
            let outcome = write
                .execute("create_or_update_vault", || {
                    client.create_or_update_vault(name, &settings.vault_location, &properties)
                })
                .await?;
            require_response("create_or_update_vault", outcome)?
        }
        outcome @ Outcome::Exhausted { .. } => return require_response("get_vault", outcome),
    };

    if !vault.is_provisioned() {
        wait_until_provisioned(client, &poll, &vault).await?;
    }

    let outcome = write.execute("get_vault", || client.get_vault(name)).await?;
    let vault = require_response("get_vault", outcome)?;
    info!(uri = ?vault.properties.vault_uri, "Vault ready");
    Ok(vault)
}

/// Policy for provisioning polls: the configured retry set plus 202, paced
/// by the poll settings.
fn poll_policy(settings: &KeyVaultSettings) -> KeyVaultResult<RetryPolicy> {
    let mut retry_on = settings.retry.retry_on.clone();
    retry_on.insert(ACCEPTED);
    Ok(RetryPolicy::new(
        settings
            .retry
            .clone()
            .with_initial_backoff(settings.poll_interval)
            .with_max_attempts(settings.poll_attempts)
            .with_retry_on(retry_on)
            .with_abort_on(MANAGEMENT_ABORT_ON),
    )?)
}

/// Poll until provisioning succeeds.
///
/// An unfinished vault counts as a 202 failure, so polls back off like any
/// other retriable status.
async fn wait_until_provisioned(
    client: &ManagementClient,
    poll: &RetryPolicy,
    vault: &Vault,
) -> KeyVaultResult<()> {
    let name = vault.name.as_str();
    let outcome = poll
        .execute("await_provisioning", move || async move {
            let vault = client.get_vault(name).await?;
            if vault.is_provisioned() {
                Ok::<(), KeyVaultError>(())
            } else if vault.is_failed() {
                Err(KeyVaultError::ProvisioningFailed {
                    name: name.to_string(),
                    state: vault.provisioning_state().to_string(),
                })
            } else {
                Err(KeyVaultError::ProvisioningIncomplete {
                    name: name.to_string(),
                    state: vault.provisioning_state().to_string(),
                })
            }
        })
        .await?;

    if let Outcome::Exhausted { attempts, .. } = outcome {
        warn!(attempts, "Vault did not finish provisioning");
    }
    require_response("await_provisioning", outcome)
}
