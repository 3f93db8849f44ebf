use crate::core::mifare::{KeyReference, KeyType, KEY_LENGTH};
use crate::core::orchestrator::AuthSettings;
use crate::core::utils::parse_hex;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// PC/SC context scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    User,
    System,
}

impl std::str::FromStr for ContextScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ContextScope::User),
            "system" => Ok(ContextScope::System),
            _ => Err(format!("Invalid scope: {s}")),
        }
    }
}

impl From<ContextScope> for pcsc::Scope {
    fn from(scope: ContextScope) -> Self {
        match scope {
            ContextScope::User => pcsc::Scope::User,
            ContextScope::System => pcsc::Scope::System,
        }
    }
}

/// Server configuration, loaded from an optional JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    pub scope: ContextScope,
    /// "A" or "B"
    pub key_type: String,
    /// Key slot referenced during authentication (0 or 1)
    pub key_slot: u8,
    /// Hex key loaded into the reader before each authentication
    pub key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            scope: ContextScope::User,
            key_type: "A".to_string(),
            key_slot: 0,
            key: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.auth_settings()?;
        Ok(config)
    }

    /// Authentication settings derived from the key fields
    pub fn auth_settings(&self) -> Result<AuthSettings> {
        let key_type = match self.key_type.to_uppercase().as_str() {
            "A" => KeyType::A,
            "B" => KeyType::B,
            other => bail!("Invalid key type: '{other}' (expected A or B)"),
        };

        if self.key_slot > 1 {
            bail!("Invalid key slot: {} (expected 0 or 1)", self.key_slot);
        }

        let load_key = match &self.key {
            Some(hex_key) => {
                let bytes = parse_hex(hex_key).context("Failed to parse configured key")?;
                let key: [u8; KEY_LENGTH] = bytes.as_slice().try_into().with_context(|| {
                    format!("Key must be {KEY_LENGTH} bytes, got {}", bytes.len())
                })?;
                Some(key)
            }
            None => None,
        };

        Ok(AuthSettings {
            key: KeyReference {
                key_type,
                slot: self.key_slot,
            },
            load_key,
        })
    }
}
