//! Configuration types.
//!
//! Settings are plain serde structs read from a JSON file at startup.
//! Every field has a default, so an empty object (or no file at all)
//! yields a working configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    NotFound(String),
    /// Failed to read configuration.
    ReadError(String),
    /// Configuration data is invalid.
    InvalidData(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(path) => write!(f, "Configuration not found: {}", path),
            ConfigError::ReadError(msg) => write!(f, "Read error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Store Settings
// ============================================================================

/// Tuning for the signal store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Live updates a subscriber may fall behind before it is closed.
    pub subscriber_queue_capacity: usize,

    /// TTL used when a lock request does not name one.
    pub default_lock_ttl_ms: u64,

    /// Upper bound for lock TTLs; longer requests are clamped.
    pub max_lock_ttl_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
            default_lock_ttl_ms: 30_000,
            max_lock_ttl_ms: 300_000,
        }
    }
}

impl StoreConfig {
    /// Resolve a requested TTL against the default and the cap.
    pub fn lock_ttl(&self, requested: Option<Duration>) -> Duration {
        let requested = requested.unwrap_or(Duration::from_millis(self.default_lock_ttl_ms));
        requested.min(Duration::from_millis(self.max_lock_ttl_ms))
    }
}

// ============================================================================
// Process Settings
// ============================================================================

/// Top-level settings for the vehicle shadow server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShadowSettings {
    /// Server name sent in the Hello message.
    pub name: String,

    /// WebSocket RPC listen address.
    pub ws_addr: SocketAddr,

    /// Read-only HTTP API listen address.
    pub http_addr: SocketAddr,

    pub store: StoreConfig,

    /// Replaces the built-in catalog when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<CatalogEntry>>,

    pub simulator: SimulatorSettings,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            name: "vehicle-shadow".to_string(),
            ws_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 50052)),
            store: StoreConfig::default(),
            catalog: None,
            simulator: SimulatorSettings::default(),
        }
    }
}

/// Settings for the built-in drive simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulatorSettings {
    pub enabled: bool,

    /// Interval between simulated telemetry frames.
    pub period_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 1000,
        }
    }
}

impl ShadowSettings {
    /// Parse settings from a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }
}

/// Load settings from a JSON file.
pub fn load_settings(path: &Path) -> Result<ShadowSettings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
        _ => ConfigError::ReadError(e.to_string()),
    })?;
    ShadowSettings::from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = ShadowSettings::from_json("{}").unwrap();
        assert_eq!(settings.name, "vehicle-shadow");
        assert_eq!(settings.store, StoreConfig::default());
        assert!(settings.catalog.is_none());
        assert!(settings.simulator.enabled);
    }

    #[test]
    fn test_partial_override() {
        let settings = ShadowSettings::from_json(
            r#"{
                "wsAddr": "127.0.0.1:9000",
                "store": { "subscriberQueueCapacity": 8 },
                "simulator": { "enabled": false }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.ws_addr.port(), 9000);
        assert_eq!(settings.store.subscriber_queue_capacity, 8);
        assert_eq!(settings.store.default_lock_ttl_ms, 30_000);
        assert!(!settings.simulator.enabled);
        assert_eq!(settings.simulator.period_ms, 1000);
    }

    #[test]
    fn test_catalog_override() {
        let settings = ShadowSettings::from_json(
            r#"{
                "catalog": [{
                    "path": "Vehicle.Cabin.Temperature",
                    "dataType": "float",
                    "unit": "°C",
                    "default": {"type": "float", "value": 21.0}
                }]
            }"#,
        )
        .unwrap();

        let catalog = settings.catalog.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].path.as_str(), "Vehicle.Cabin.Temperature");
    }

    #[test]
    fn test_invalid_document() {
        let err = ShadowSettings::from_json(r#"{"wsAddr": "nowhere"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidData(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_settings(Path::new("/nonexistent/vehicle-shadow.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_lock_ttl_resolution() {
        let config = StoreConfig::default();
        assert_eq!(config.lock_ttl(None), Duration::from_secs(30));
        assert_eq!(
            config.lock_ttl(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.lock_ttl(Some(Duration::from_secs(3600))),
            Duration::from_secs(300)
        );
    }
}
