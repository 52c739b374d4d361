use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::resolver::ResolveMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Ambiguity policy for filter resolution: lenient (first match wins) or
  /// strict (only unique exact matches are substituted).
  #[serde(default)]
  pub resolve_mode: ResolveMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  /// Tenant key. Every cache store is namespaced by this id.
  pub organization_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Full TTL for generic response-cache entries, in milliseconds.
  pub ttl_ms: u64,
  /// Fraction of the TTL after which an entry is stale (0.0..=1.0).
  pub stale_fraction: f64,
  /// How old the reference mirror may be before a resync is preferred.
  pub reference_max_age_ms: u64,
  /// Override for the store directory (defaults to the platform data dir).
  pub data_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_ms: 300_000,
      stale_fraction: 0.5,
      reference_max_age_ms: 86_400_000,
      data_dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rolodex.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rolodex/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/rolodex/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("rolodex.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rolodex").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks ROLODEX_API_TOKEN first, then PM_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("ROLODEX_API_TOKEN")
      .or_else(|_| std::env::var("PM_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set ROLODEX_API_TOKEN or PM_API_TOKEN environment variable.")
      })
  }

  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::milliseconds(self.cache.ttl_ms as i64)
  }

  pub fn reference_max_age(&self) -> chrono::Duration {
    chrono::Duration::milliseconds(self.cache.reference_max_age_ms as i64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.ttl_ms, 300_000);
    assert_eq!(config.stale_fraction, 0.5);
  }

  #[test]
  fn test_parse_minimal_yaml() {
    let yaml = "api:\n  base_url: https://api.example.com/v2/\n  organization_id: \"42\"\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.api.organization_id, "42");
    assert_eq!(config.resolve_mode, ResolveMode::Lenient);
    assert_eq!(config.cache.reference_max_age_ms, 86_400_000);
  }

  #[test]
  fn test_parse_strict_mode() {
    let yaml = "api:\n  base_url: https://api.example.com/v2/\n  organization_id: \"42\"\nresolve_mode: strict\ncache:\n  ttl_ms: 1000\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.resolve_mode, ResolveMode::Strict);
    assert_eq!(config.cache.ttl_ms, 1000);
    // Unset cache fields keep their defaults
    assert_eq!(config.cache.stale_fraction, 0.5);
  }
}
