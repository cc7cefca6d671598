//! Application configuration
//!
//! Loads the YAML file naming the input port and the mapping file for the
//! monitored device.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use watcher::MappingWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    /// Mapping file, relative paths resolve against the config file
    pub mapping: PathBuf,
    /// Reload the mapping file when it changes
    #[serde(default = "default_true")]
    pub hot_reload: bool,
}

/// MIDI input configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Substring of the input port name (case-insensitive)
    pub input_port: String,
    /// Name used in logs, defaults to the matched port name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        config.mapping = config.resolve_mapping(path);

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.trim().is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.mapping.as_os_str().is_empty() {
            anyhow::bail!("mapping path cannot be empty");
        }
        Ok(())
    }

    fn resolve_mapping(&self, config_path: &Path) -> PathBuf {
        if self.mapping.is_absolute() {
            return self.mapping.clone();
        }
        config_path
            .parent()
            .map(|dir| dir.join(&self.mapping))
            .unwrap_or_else(|| self.mapping.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_resolves_mapping_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");
        std::fs::write(
            &config_path,
            r#"
midi:
  input_port: "DJControl"
mapping: "mappings/deck.yaml"
"#,
        )?;

        let config = AppConfig::load(&config_path).await?;
        assert_eq!(config.midi.input_port, "DJControl");
        assert_eq!(config.midi.device_name, None);
        assert!(config.hot_reload);
        assert_eq!(config.mapping, temp_dir.path().join("mappings/deck.yaml"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_port_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("surface.yaml");
        std::fs::write(&config_path, "midi: { input_port: \"\" }\nmapping: deck.yaml\n")?;

        let err = AppConfig::load(&config_path).await.unwrap_err();
        assert!(err.to_string().contains("input_port"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(AppConfig::load("/nonexistent/surface.yaml").await.is_err());
    }
}
