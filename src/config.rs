//! Bridge configuration.
//!
//! Loaded from a YAML file with two top-level sections (`mqtt`, `tcp`)
//! plus the text encoding used when byte-valued control data has to be
//! rendered into JSON.
//!
//! # Example
//!
//! ```yaml
//! mqtt:
//!   connection:
//!     broker: broker.example.net
//!     port: 8883
//!     client_id: osc-bridge
//!     username: bridge
//!     password: secret
//!     ca_certs: /etc/bridge/ca.crt
//!   topics:
//!     publish: stat
//!     subscribe: cmnd
//! tcp:
//!   bind: 0.0.0.0
//!   port: 10023
//!   max_connections: 16
//! encoding: utf-8
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Broker session settings and topic prefixes.
    pub mqtt: MqttSection,
    /// TCP relay settings.
    pub tcp: TcpConfig,
    /// Text encoding for byte-valued control data (only `utf-8` is
    /// supported).
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

/// The `mqtt:` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSection {
    /// Broker connection settings.
    pub connection: MqttConfig,
    /// Topic prefixes for the two routing directions.
    pub topics: TopicConfig,
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    pub broker: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// Path to the CA certificate; enables TLS when present.
    #[serde(default)]
    pub ca_certs: Option<PathBuf>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

/// Topic prefixes for the two routing directions.
///
/// Control messages publish under `<publish><address>`; the bridge
/// subscribes to `<subscribe>/#` and strips `<subscribe>` from incoming
/// topics to recover the control address.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    /// Status topic prefix (control → broker).
    pub publish: String,
    /// Command topic prefix (broker → control).
    pub subscribe: String,
}

/// TCP relay settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    /// Address to bind the listener to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to bind the listener to.
    pub port: u16,
    /// Maximum number of simultaneously connected clients.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> usize {
    16
}

impl BridgeConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: BridgeConfig =
            serde_yml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Validate cross-field constraints.
    ///
    /// The CA certificate path (if any) must exist, and the encoding
    /// must be UTF-8.
    pub fn validate(&self) -> Result<()> {
        let normalized = self.encoding.to_ascii_lowercase().replace('_', "-");
        if normalized != "utf-8" && normalized != "utf8" {
            return Err(BridgeError::Config(format!(
                "unsupported text encoding: {}",
                self.encoding
            )));
        }
        if let Some(ca) = &self.mqtt.connection.ca_certs {
            if !ca.exists() {
                return Err(BridgeError::Config(format!(
                    "CA certificate file {} does not exist",
                    ca.display()
                )));
            }
        }
        Ok(())
    }

    /// Listener bind address as `host:port`.
    pub fn tcp_bind_addr(&self) -> String {
        format!("{}:{}", self.tcp.bind, self.tcp.port)
    }
}
