//! Key vault control-plane and data-plane sample.
//!
//! Ensures a vault exists through the management plane, then reads and writes
//! secrets and keys through the data plane. Every call runs under a
//! classified [`rust_common::RetryPolicy`].

pub mod config;
pub mod credential;
pub mod data;
pub mod error;
pub mod management;
pub mod models;
pub mod provision;

pub use config::KeyVaultSettings;
pub use credential::{AccessToken, StaticTokenCredential, TokenCredential};
pub use data::DataClient;
pub use error::{KeyVaultError, KeyVaultResult};
pub use management::ManagementClient;
pub use models::{Key, KeyType, Secret, Vault};
pub use provision::{default_vault_properties, ensure_vault};
