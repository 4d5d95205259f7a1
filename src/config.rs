//! Konfiguration
//!
//! Wird als JSON vom Host geladen; Zugangsdaten können über
//! Umgebungsvariablen überschrieben werden.

use crate::i18n::Dictionary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid transport URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SIP ACCOUNT
// ============================================================================

/// Zugangsdaten und Transport-Parameter für die Signaling-Engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SipAccountConfig {
    pub server: String,
    pub port: u16,
    pub path: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub register_expires_secs: u32,
    pub reconnection_attempts: u32,
    pub no_answer_timeout_secs: u32,
    /// Verzögerung zwischen Transport-Connect und REGISTER
    pub register_delay_ms: u64,
}

impl Default for SipAccountConfig {
    fn default() -> Self {
        Self {
            server: "webrtc.example.invalid".to_string(),
            port: 443,
            path: "/ws".to_string(),
            username: String::new(),
            password: String::new(),
            display_name: String::new(),
            register_expires_secs: 300,
            reconnection_attempts: 99,
            no_answer_timeout_secs: 120,
            register_delay_ms: 500,
        }
    }
}

impl SipAccountConfig {
    /// WebSocket URL des Signaling-Servers (`wss://server:port/path`)
    pub fn transport_url(&self) -> Result<Url, ConfigError> {
        let raw = format!("wss://{}:{}{}", self.server, self.port, self.path);
        Ok(Url::parse(&raw)?)
    }

    /// SIP URI des Benutzers
    pub fn uri(&self) -> String {
        format!("sip:{}@{}", self.username, self.server)
    }

    pub fn register_delay(&self) -> Duration {
        Duration::from_millis(self.register_delay_ms)
    }
}

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Präfix für alle Schlüssel im Host-Store
    pub namespace: String,
    /// Pfad zur SQLite-Datei (None = App-Datenverzeichnis)
    pub database_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "softphone".to_string(),
            database_path: None,
        }
    }
}

// ============================================================================
// SOFTPHONE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftphoneConfig {
    pub account: SipAccountConfig,
    pub device_poll_interval_secs: u64,
    pub storage: StorageConfig,
    pub labels: Dictionary,
}

impl Default for SoftphoneConfig {
    fn default() -> Self {
        Self {
            account: SipAccountConfig::default(),
            device_poll_interval_secs: 10,
            storage: StorageConfig::default(),
            labels: Dictionary::default(),
        }
    }
}

impl SoftphoneConfig {
    /// Lädt die Konfiguration aus einer JSON-Datei
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parst die Konfiguration aus einem JSON-String
    ///
    /// Teilweise angegebene Labels ergänzen die Standardtexte.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: SoftphoneConfig = serde_json::from_str(raw)?;

        let mut labels = Dictionary::default();
        labels.merge(config.labels);
        config.labels = labels;

        config.validate()?;
        Ok(config)
    }

    /// Übernimmt Zugangsdaten aus Umgebungsvariablen
    pub fn apply_env(&mut self) {
        if let Ok(server) = std::env::var("SOFTPHONE_SIP_SERVER") {
            self.account.server = server;
        }
        if let Ok(username) = std::env::var("SOFTPHONE_SIP_USERNAME") {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var("SOFTPHONE_SIP_PASSWORD") {
            self.account.password = password;
        }
        if let Ok(display_name) = std::env::var("SOFTPHONE_DISPLAY_NAME") {
            self.account.display_name = display_name;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "device_poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.account.server.trim().is_empty() {
            return Err(ConfigError::Invalid("account.server is empty".to_string()));
        }
        Ok(())
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_secs(self.device_poll_interval_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
