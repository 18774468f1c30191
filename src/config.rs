use crate::envelope::MAX_STATE_BYTES;
use crate::store::STORAGE_KEY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client-side sync settings, read from a JSON file and overridden by flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Full URL of the progress resource. Sync is disabled when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_state_bytes")]
    pub max_state_bytes: usize,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_debounce_ms() -> u64 {
    700
}

fn default_max_state_bytes() -> usize {
    MAX_STATE_BYTES
}

fn default_store_path() -> PathBuf {
    PathBuf::from(format!("{}.json", STORAGE_KEY))
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            debounce_ms: default_debounce_ms(),
            max_state_bytes: default_max_state_bytes(),
            store_path: default_store_path(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Endpoint, ignoring blank values.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(700));
        assert_eq!(config.max_state_bytes, 900_000);
        assert_eq!(config.store_path, PathBuf::from("bangla10-srs.json"));
        assert!(config.endpoint().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "endpoint": "http://localhost:3000/progress",
            "debounce_ms": 50,
            "max_state_bytes": 1024,
            "store_path": "/tmp/progress.json"
        }"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.endpoint(), Some("http://localhost:3000/progress"));
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.max_state_bytes, 1024);
        assert_eq!(config.store_path, PathBuf::from("/tmp/progress.json"));
    }

    #[test]
    fn test_blank_endpoint_is_disabled() {
        let config = SyncConfig {
            endpoint: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.endpoint().is_none());
    }
}
