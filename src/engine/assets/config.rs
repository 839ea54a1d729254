// Asset runtime configuration

use super::sizes::AssetSize;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration of the asset runtime
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetConfig {
    /// Directory asset URLs are resolved against
    pub base_path: PathBuf,

    /// Extra attempts for a failed read
    pub max_retries: u32,

    /// Worker threads of the background transport
    pub fetch_workers: usize,

    /// Size profiles for the `%SIZE%` URL token
    pub sizes: Vec<AssetSize>,

    /// Display size used to pick a size profile
    pub display_width: u32,
    pub display_height: u32,

    /// Default concurrency policy of loads
    pub start_all: bool,

    /// Cache every asset by default
    pub cache_all: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("assets"),
            max_retries: 2,
            fetch_workers: 4,
            sizes: vec![AssetSize::new("sd", 800, 0.5), AssetSize::new("hd", 1600, 1.0)],
            display_width: 1280,
            display_height: 720,
            start_all: true,
            cache_all: false,
        }
    }
}

impl AssetConfig {
    /// Parse configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid asset configuration")
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssetConfig::default();
        assert_eq!(config.base_path, PathBuf::from("assets"));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.fetch_workers, 4);
        assert_eq!(config.sizes.len(), 2);
        assert!(config.start_all);
        assert!(!config.cache_all);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AssetConfig::from_json(r#"{"maxRetries": 5, "cacheAll": true}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert!(config.cache_all);
        assert_eq!(config.display_width, 1280);
    }

    #[test]
    fn test_sizes_from_json() {
        let config = AssetConfig::from_json(
            r#"{"sizes": [{"id": "low", "maxSize": 480, "scale": 0.25}]}"#,
        )
        .unwrap();
        assert_eq!(config.sizes, vec![AssetSize::new("low", 480, 0.25)]);
    }

    #[test]
    fn test_invalid_json() {
        assert!(AssetConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(AssetConfig::from_file("/nonexistent/assets.json").is_err());
    }
}
