//! Optional on-disk configuration for the server. Everything here has a
//! sensible default; a missing config file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError { config_path: PathBuf, source: std::io::Error },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError { config_path: PathBuf, source: toml::de::Error },
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_max_line_width() -> u32 {
    100
}

fn default_tab_width() -> u32 {
    4
}

/// Module-root and tuning configuration. All fields have defaults so the
/// server runs with no config file at all; `workspaceFolders` from the
/// protocol still take precedence over `module_roots` when both are given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extra module roots to search for imports beyond the protocol's
    /// `workspaceFolders`. Tilde/env expanded on load.
    #[serde(default)]
    pub module_roots: Vec<PathBuf>,

    /// Debounce interval, in milliseconds, before a changed document is
    /// re-analyzed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Display-width threshold the formatter wraps long lines at.
    #[serde(default = "default_max_line_width")]
    pub max_line_width: u32,

    /// Display width of a tab stop, used by the formatter's wrap-width math.
    #[serde(default = "default_tab_width")]
    pub tab_width: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_roots: Vec::new(),
            debounce_ms: default_debounce_ms(),
            max_line_width: default_max_line_width(),
            tab_width: default_tab_width(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path)
            .map_err(|source| ConfigError::ConfigReadError { config_path: config_path.to_path_buf(), source })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError { config_path: config_path.to_path_buf(), source })?;

        config.module_roots = config.module_roots.iter().map(|p| Self::expand_path(p).unwrap_or_else(|| p.clone())).collect();

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/schema-ls");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        shellexpand::full(&path_str).ok().map(|expanded| PathBuf::from(expanded.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_path_has_no_tilde() {
        let path = Config::config_path();
        let path_str = path.to_string_lossy();
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/schema-ls/config.toml"));
    }

    #[test]
    fn default_config_has_sensible_values() {
        let config = Config::default();
        assert!(config.module_roots.is_empty());
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.max_line_width, 100);
        assert_eq!(config.tab_width, 4);
    }

    #[test]
    fn missing_config_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        assert!(Config::load_from_path(&path).unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config { module_roots: vec![PathBuf::from("/tmp/schemas")], debounce_ms: 200, max_line_width: 80, tab_width: 2 };
        config.save_to_path(&path).unwrap();
        let loaded = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.module_roots, config.module_roots);
        assert_eq!(loaded.debounce_ms, 200);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = 300\n").unwrap();
        let loaded = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.debounce_ms, 300);
        assert_eq!(loaded.max_line_width, 100);
    }

    #[test]
    fn module_root_tilde_is_expanded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "module_roots = [\"~/schemas\"]\n").unwrap();
        let loaded = Config::load_from_path(&path).unwrap().unwrap();
        assert!(!loaded.module_roots[0].to_string_lossy().starts_with('~'));
    }
}
