//! Server records and application configuration types

use serde::{Deserialize, Serialize};

/// Config slot ids used by `ssh_set_config`
///
/// The frontend addresses individual settings by slot instead of sending
/// the whole config back on every change.
pub mod config_slot {
    pub const LOCAL_PATH: u32 = 1;
    pub const REMOTE_PATH: u32 = 2;
    pub const EXPAND_LIST: u32 = 3;
    pub const LOCAL_GRPS: u32 = 4;
    pub const REMOTE_GRPS: u32 = 5;
    pub const FILE_NAME: u32 = 6;
    pub const FILE_GRPS: u32 = 7;
}

/// A saved server entry as stored in the encrypted store
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerDetail {
    pub name: String,
    pub group: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub cert_pass: String,
    pub cert_path: String,
    pub use_proxy: bool,
}

impl ServerDetail {
    /// Uniqueness key for this entry
    ///
    /// Two servers collide when group and name match case-insensitively.
    pub fn store_key(&self) -> String {
        format!(
            "{}/{}",
            self.group.to_lowercase(),
            self.name.to_lowercase()
        )
    }
}

/// Listing entry sent to the frontend (id is string-encoded over the wire)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerItem {
    pub id: String,
    pub name: String,
}

/// A named group of servers for the sidebar listing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerGroup {
    pub name: String,
    pub servers: Vec<ServerItem>,
}

/// Application configuration, persisted as plain JSON
///
/// Unknown fields are ignored and missing fields default so old config
/// files keep loading across versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP CONNECT proxy address ("host:port"), empty = direct
    #[serde(default)]
    pub proxy_addr: String,

    /// Terminal font family
    #[serde(default = "default_font_name")]
    pub font_name: String,

    /// Last used transfer file name
    #[serde(default)]
    pub file_name: String,

    /// Last local directory in the transfer panel
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Last remote directory in the transfer panel
    #[serde(default = "default_remote_path")]
    pub remote_path: String,

    /// Groups expanded in the sidebar
    #[serde(default = "default_expand_list")]
    pub expand_list: Vec<String>,

    /// Recent local path history
    #[serde(default)]
    pub local_grps: Vec<String>,

    /// Recent remote path history
    #[serde(default)]
    pub remote_grps: Vec<String>,

    /// Recent file name history
    #[serde(default)]
    pub file_grps: Vec<String>,
}

fn default_font_name() -> String {
    String::from("DejaVuSansMono Nerd Font Mono")
}

fn default_local_path() -> String {
    dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn default_remote_path() -> String {
    String::from("/home")
}

fn default_expand_list() -> Vec<String> {
    vec![String::from("Default")]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_addr: String::new(),
            font_name: default_font_name(),
            file_name: String::new(),
            local_path: default_local_path(),
            remote_path: default_remote_path(),
            expand_list: default_expand_list(),
            local_grps: Vec::new(),
            remote_grps: Vec::new(),
            file_grps: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_case_insensitive() {
        let a = ServerDetail {
            name: "Web-01".to_string(),
            group: "Production".to_string(),
            ..Default::default()
        };
        let b = ServerDetail {
            name: "web-01".to_string(),
            group: "PRODUCTION".to_string(),
            ..Default::default()
        };
        assert_eq!(a.store_key(), b.store_key());
        assert_eq!(a.store_key(), "production/web-01");
    }

    #[test]
    fn test_config_defaults_on_empty_json() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.font_name, default_font_name());
        assert_eq!(cfg.remote_path, "/home");
        assert_eq!(cfg.expand_list, vec!["Default"]);
        assert!(cfg.proxy_addr.is_empty());
    }

    #[test]
    fn test_config_roundtrip_keeps_histories() {
        let mut cfg = AppConfig::default();
        cfg.local_grps = vec!["/tmp".to_string(), "/var".to_string()];
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.local_grps, cfg.local_grps);
    }
}
