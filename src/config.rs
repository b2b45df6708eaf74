use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unique bot identifier, used in MQTT topic names
    #[serde(default = "default_bot_id")]
    pub bot_id: String,

    /// MQTT chat bridge configuration
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Horizon / ledger network configuration
    #[serde(default)]
    pub horizon: HorizonConfig,

    /// Chat handle addressing scheme
    #[serde(default)]
    pub addressing: AddressingConfig,

    /// Path of the wallet registry snapshot file
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonConfig {
    pub url: String,
    pub friendbot_url: String,
    pub network_passphrase: String,
    #[serde(default = "default_base_fee")]
    pub base_fee: u32,
    /// Transaction validity window in seconds (upper time bound)
    #[serde(default = "default_tx_timeout")]
    pub tx_timeout_secs: u64,
}

/// How a bare user-typed handle (e.g. a phone number) becomes the transport's
/// canonical chat identity. Must match the transport's own addressing exactly,
/// or recipient lookups miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    pub country_code: String,
    pub suffix: String,
}

fn default_bot_id() -> String {
    "lumenbot".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_base_fee() -> u32 {
    100
}

fn default_tx_timeout() -> u64 {
    300
}

fn default_registry_path() -> String {
    "wallets.json".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            url: "https://horizon-testnet.stellar.org".to_string(),
            friendbot_url: "https://friendbot.stellar.org".to_string(),
            network_passphrase: "Test SDF Network ; September 2015".to_string(),
            base_fee: default_base_fee(),
            tx_timeout_secs: default_tx_timeout(),
        }
    }
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            country_code: "91".to_string(),
            suffix: "@chat.local".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_id: default_bot_id(),
            mqtt: MqttConfig::default(),
            horizon: HorizonConfig::default(),
            addressing: AddressingConfig::default(),
            registry_path: default_registry_path(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(bot_id = %config.bot_id, broker = %config.mqtt.broker, "configuration loaded");
        Ok(config)
    }
}
