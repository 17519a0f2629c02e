//! Configuration for the setup node. Parsed from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use skein_routing::{PublicKey, SecretKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    pub pubkey: PublicKey,
    pub seckey: SecretKey,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub messaging: MessagingSection,
    #[serde(default)]
    pub network: NetworkSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingSection {
    /// URL of the messaging discovery service.
    #[serde(default = "default_discovery")]
    pub discovery: String,
    /// Upstream messaging-server connections established before accepting.
    #[serde(default)]
    pub server_count: u16,
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self { discovery: default_discovery(), server_count: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Where the messenger endpoint binds.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_discovery() -> String {
    "http://127.0.0.1:9510".into()
}

fn default_listen_addr() -> String {
    "0.0.0.0:9440".into()
}

impl SetupConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SetupConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
