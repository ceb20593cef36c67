//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.edge-examples/config.json`) and environment.
//! Every field has a default, so a missing file or an empty object is a valid config.

use crate::rpc::{Locator, Role, DEFAULT_TIMEOUT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where Edge Core listens and how long calls may take.
    #[serde(default)]
    pub edge: EdgeConfig,

    /// Protocol translator example settings.
    #[serde(default)]
    pub translator: TranslatorConfig,

    /// Gateway resource manager example settings.
    #[serde(default)]
    pub resource_manager: ResourceManagerConfig,
}

/// Edge Core connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Unix socket Edge Core listens on (default "/tmp/edge.sock"). Overridden by EDGE_SOCKET_PATH env.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Default timeout for a single call in milliseconds (default 10000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl EdgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Where a client in `role` connects. Uses `socket_path` as is; apply
    /// [`resolve_socket_path`] first to honour EDGE_SOCKET_PATH.
    pub fn locator(&self, role: Role) -> Locator {
        Locator::new(self.socket_path.clone(), role.api_path())
    }
}

/// Protocol translator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatorConfig {
    /// Name the translator registers with.
    #[serde(default = "default_translator_name")]
    pub name: String,

    /// Device the walkthrough registers and updates.
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Timeout for `download_asset` in milliseconds (default 30 minutes).
    #[serde(default = "default_fota_timeout_ms")]
    pub fota_timeout_ms: u64,

    /// Simulated reboot time after a firmware download, in milliseconds.
    #[serde(default = "default_reboot_delay_ms")]
    pub reboot_delay_ms: u64,
}

/// Gateway resource manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManagerConfig {
    #[serde(default = "default_resource_manager_name")]
    pub name: String,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/edge.sock")
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_translator_name() -> String {
    "simple-pt-example".to_string()
}

fn default_device_id() -> String {
    "example-fota-device".to_string()
}

fn default_fota_timeout_ms() -> u64 {
    1_800_000
}

fn default_reboot_delay_ms() -> u64 {
    5_000
}

fn default_resource_manager_name() -> String {
    "simple-grm-example".to_string()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            name: default_translator_name(),
            device_id: default_device_id(),
            fota_timeout_ms: default_fota_timeout_ms(),
            reboot_delay_ms: default_reboot_delay_ms(),
        }
    }
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            name: default_resource_manager_name(),
        }
    }
}

/// Resolve the Edge Core socket: env EDGE_SOCKET_PATH overrides config.
pub fn resolve_socket_path(config: &Config) -> PathBuf {
    std::env::var("EDGE_SOCKET_PATH")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config.edge.socket_path.clone())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("EDGE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".edge-examples").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, the default path, or EDGE_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_edge_examples() {
        let c = Config::default();
        assert_eq!(c.edge.socket_path, PathBuf::from("/tmp/edge.sock"));
        assert_eq!(c.edge.request_timeout(), Duration::from_secs(10));
        assert_eq!(c.edge.request_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(c.translator.name, "simple-pt-example");
        assert_eq!(c.translator.device_id, "example-fota-device");
        assert_eq!(c.translator.fota_timeout_ms, 1_800_000);
        assert_eq!(c.translator.reboot_delay_ms, 5_000);
        assert_eq!(c.resource_manager.name, "simple-grm-example");
    }

    #[test]
    fn locator_uses_role_api_path() {
        let l = EdgeConfig::default().locator(Role::ResourceManager);
        assert_eq!(l.display_url(), "ws+unix:///tmp/edge.sock:/1/grm");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"edge":{"requestTimeoutMs":500},"resourceManager":{}}"#).unwrap();
        assert_eq!(c.edge.request_timeout_ms, 500);
        assert_eq!(c.edge.socket_path, PathBuf::from("/tmp/edge.sock"));
        assert_eq!(c.resource_manager.name, "simple-grm-example");
        assert_eq!(c.translator.name, "simple-pt-example");
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(Config::default()).unwrap();
        assert!(v["edge"]["socketPath"].is_string());
        assert!(v["translator"]["fotaTimeoutMs"].is_u64());
        assert!(v["resourceManager"]["name"].is_string());
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let path = std::env::temp_dir()
            .join(format!("edge-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.translator.device_id, "example-fota-device");
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = std::env::temp_dir().join(format!("edge-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(Some(path)).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
