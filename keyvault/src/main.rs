//! Key vault sample.
//!
//! Ensures the configured vault exists, round-trips a secret and creates a key.

use std::sync::Arc;

use anyhow::Context;
use keyvault::{
    DataClient, KeyType, KeyVaultSettings, ManagementClient, StaticTokenCredential,
    TokenCredential, ensure_vault,
};
use rust_common::{TracingConfig, init_tracing};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

const SAMPLE_SECRET: &str = "sample-secret";
const SAMPLE_KEY: &str = "sample-key";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = KeyVaultSettings::from_env().context("loading configuration")?;
    init_tracing(&TracingConfig::from_env("keyvault-sample"));

    let credential: Arc<dyn TokenCredential> =
        Arc::new(StaticTokenCredential::from_env().context("loading access tokens")?);

    let management = ManagementClient::new(&settings, Arc::clone(&credential))?;
    let vault = ensure_vault(&management, &settings)
        .await
        .with_context(|| format!("ensuring vault {}", settings.vault_name))?;
    info!(vault = %vault.name, id = %vault.id, "Using vault");

    let data = DataClient::new(&settings.vault_uri(&vault), &settings, credential)?;
    info!(uri = data.vault_uri(), "Data-plane client ready");

    let written = data
        .set_secret(SAMPLE_SECRET, &SecretString::from(uuid::Uuid::new_v4().to_string()))
        .await
        .context("writing sample secret")?;
    let read = data
        .get_secret(SAMPLE_SECRET)
        .await
        .context("reading sample secret")?;
    anyhow::ensure!(
        written.value.expose_secret() == read.value.expose_secret(),
        "secret read back does not match the value written"
    );
    info!(name = %read.name, version = ?read.version, "Secret round-trip complete");

    let key = data
        .create_key(SAMPLE_KEY, KeyType::Rsa { size: 2048 })
        .await
        .context("creating sample key")?;
    info!(kid = %key.id, kty = %key.kty, "Key created");

    Ok(())
}
