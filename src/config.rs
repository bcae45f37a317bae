use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::tree::TreeOptions;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/ctree.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tree: TreeOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_layers_path")]
    pub layers_path: PathBuf,
    #[serde(default = "default_tree_path")]
    pub tree_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            layers_path: default_layers_path(),
            tree_path: default_tree_path(),
        }
    }
}

fn default_layers_path() -> PathBuf {
    PathBuf::from("./data/layers.json")
}
fn default_tree_path() -> PathBuf {
    PathBuf::from("./data/tree.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration used when no file is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Same as [`minimal`](Config::minimal) with both stores under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        let mut config = Self::minimal();
        config.storage.layers_path = dir.join("layers.json");
        config.storage.tree_path = dir.join("tree.json");
        config
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let config = Config::minimal();
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate storage
    if config.storage.layers_path.as_os_str().is_empty() {
        anyhow::bail!("storage.layers_path must not be empty");
    }
    if config.storage.tree_path.as_os_str().is_empty() {
        anyhow::bail!("storage.tree_path must not be empty");
    }
    if config.storage.layers_path == config.storage.tree_path {
        anyhow::bail!(
            "storage.layers_path and storage.tree_path must differ (both are '{}')",
            config.storage.layers_path.display()
        );
    }

    // Validate logging
    EnvFilter::try_new(&config.logging.level)
        .with_context(|| format!("Invalid logging.level: '{}'", config.logging.level))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::CycleGuard;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("ctree.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&write_config(&dir, "")).unwrap();
        assert_eq!(config.storage.layers_path, PathBuf::from("./data/layers.json"));
        assert_eq!(config.storage.tree_path, PathBuf::from("./data/tree.json"));
        assert!(config.tree.auto_create_layers);
        assert!(config.tree.auto_repair);
        assert!(config.tree.sort_paths);
        assert_eq!(config.tree.cycle_guard, CycleGuard::Ancestor);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[storage]
layers_path = "/tmp/l.json"
tree_path = "/tmp/t.json"

[tree]
auto_create_layers = false
sort_paths = false
cycle_guard = "substring"

[logging]
level = "context_tree=debug,warn"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.tree_path, PathBuf::from("/tmp/t.json"));
        assert!(!config.tree.auto_create_layers);
        assert!(config.tree.auto_repair);
        assert!(!config.tree.sort_paths);
        assert_eq!(config.tree.cycle_guard, CycleGuard::Substring);
    }

    #[test]
    fn test_same_storage_paths_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[storage]\nlayers_path = \"a.json\"\ntree_path = \"a.json\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_unknown_cycle_guard_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[tree]\ncycle_guard = \"maybe\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load_config(&missing).is_err());
        let config = load_or_default(&missing).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_in_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config::in_dir(dir.path());
        assert_eq!(config.storage.layers_path, dir.path().join("layers.json"));
        assert_eq!(config.storage.tree_path, dir.path().join("tree.json"));
    }
}
