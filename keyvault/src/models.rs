//! Wire types for the management and data planes.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provisioning state reported once a vault is ready.
pub const PROVISIONED: &str = "Succeeded";

/// Vault descriptor returned by the management plane.
#[derive(Debug, Clone, Deserialize)]
pub struct Vault {
    /// Resource id
    pub id: String,
    /// Vault name
    pub name: String,
    /// Region
    pub location: String,
    /// Resource tags
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Vault properties
    pub properties: VaultProperties,
}

impl Vault {
    /// Provisioning state, `"Unknown"` when absent.
    #[must_use]
    pub fn provisioning_state(&self) -> &str {
        self.properties
            .provisioning_state
            .as_deref()
            .unwrap_or("Unknown")
    }

    /// Whether the vault finished provisioning.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_state() == PROVISIONED
    }

    /// Whether provisioning ended in failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.provisioning_state(), "Failed" | "Canceled")
    }
}

/// The vault properties this sample reads; everything else stays opaque.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProperties {
    /// Data-plane URL
    #[serde(default)]
    pub vault_uri: Option<String>,
    /// Provisioning state
    #[serde(default)]
    pub provisioning_state: Option<String>,
    /// Remaining properties
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Create-or-update request body.
#[derive(Debug, Serialize)]
pub struct CreateVaultRequest<'a> {
    /// Region
    pub location: &'a str,
    /// Opaque vault properties
    pub properties: &'a serde_json::Value,
}

/// Object attributes shared by secrets and keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attributes {
    /// Whether the object is enabled
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Creation time, Unix seconds
    #[serde(default)]
    pub created: Option<i64>,
    /// Last update time, Unix seconds
    #[serde(default)]
    pub updated: Option<i64>,
}

/// Secret bundle as returned by the data plane.
#[derive(Debug, Deserialize)]
pub struct SecretBundle {
    /// Secret identifier URL
    pub id: String,
    /// Secret value
    pub value: String,
    /// Attributes
    #[serde(default)]
    pub attributes: Attributes,
}

/// A secret read from or written to a vault.
#[derive(Debug, Clone)]
pub struct Secret {
    /// Secret identifier URL
    pub id: String,
    /// Secret name
    pub name: String,
    /// Secret version, if the identifier carries one
    pub version: Option<String>,
    /// Secret value
    pub value: SecretString,
    /// Whether the secret is enabled
    pub enabled: bool,
    /// Last update time
    pub updated: Option<DateTime<Utc>>,
}

impl From<SecretBundle> for Secret {
    fn from(bundle: SecretBundle) -> Self {
        let (name, version) = split_identifier(&bundle.id, "secrets");
        Self {
            name,
            version,
            value: SecretString::from(bundle.value),
            enabled: bundle.attributes.enabled.unwrap_or(true),
            updated: bundle
                .attributes
                .updated
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            id: bundle.id,
        }
    }
}

/// Key type for key creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// RSA key of the given size in bits
    Rsa {
        /// Modulus size
        size: u32,
    },
    /// Elliptic-curve key
    Ec {
        /// Curve name, e.g. `P-256`
        curve: &'static str,
    },
}

impl KeyType {
    /// Create-key request body.
    #[must_use]
    pub fn request_body(self) -> serde_json::Value {
        match self {
            Self::Rsa { size } => serde_json::json!({ "kty": "RSA", "key_size": size }),
            Self::Ec { curve } => serde_json::json!({ "kty": "EC", "crv": curve }),
        }
    }
}

/// JSON web key as returned by the data plane.
#[derive(Debug, Deserialize)]
pub struct JsonWebKey {
    /// Key identifier URL
    pub kid: String,
    /// Key type
    pub kty: String,
    /// Permitted operations
    #[serde(default)]
    pub key_ops: Vec<String>,
}

/// Key bundle as returned by the data plane.
#[derive(Debug, Deserialize)]
pub struct KeyBundle {
    /// Public key material
    pub key: JsonWebKey,
    /// Attributes
    #[serde(default)]
    pub attributes: Attributes,
}

/// A key held in a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Key identifier URL
    pub id: String,
    /// Key name
    pub name: String,
    /// Key version, if the identifier carries one
    pub version: Option<String>,
    /// Key type
    pub kty: String,
    /// Permitted operations
    pub key_ops: Vec<String>,
    /// Whether the key is enabled
    pub enabled: bool,
}

impl From<KeyBundle> for Key {
    fn from(bundle: KeyBundle) -> Self {
        let (name, version) = split_identifier(&bundle.key.kid, "keys");
        Self {
            id: bundle.key.kid,
            name,
            version,
            kty: bundle.key.kty,
            key_ops: bundle.key.key_ops,
            enabled: bundle.attributes.enabled.unwrap_or(true),
        }
    }
}

/// Split `https://host/{collection}/{name}[/{version}]` into name and version.
fn split_identifier(id: &str, collection: &str) -> (String, Option<String>) {
    let path = url::Url::parse(id)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| id.to_string());
    let mut segments = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip_while(|s| *s != collection)
        .skip(1);
    let name = segments.next().unwrap_or_default().to_string();
    let version = segments.next().map(str::to_string);
    (name, version)
}
