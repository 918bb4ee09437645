//! Configuration storage
//!
//! Handles reading/writing the plain-JSON application config to disk.
//! Data location: ~/.mtty on macOS/Linux, %APPDATA%\Mtty on Windows.

use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::AppConfig;

const CONFIG_FILE: &str = "config.json";
const SERVERS_FILE: &str = "servers.dat";

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Get the MTTY data directory
/// Returns %APPDATA%\Mtty on Windows, ~/.mtty on macOS/Linux
pub fn data_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("Mtty"));
        }
        dirs::home_dir()
            .map(|home| home.join(".mtty"))
            .ok_or(StorageError::NoDataDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".mtty"))
            .ok_or(StorageError::NoDataDir)
    }
}

/// Path of the encrypted server store
pub fn servers_file() -> Result<PathBuf, StorageError> {
    Ok(data_dir()?.join(SERVERS_FILE))
}

/// Path of the plain-JSON config file
pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(data_dir()?.join(CONFIG_FILE))
}

/// Application config storage manager
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Create a new storage manager with the default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: config_file()?,
        })
    }

    /// Create a storage manager with a custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load the config from disk
    ///
    /// Returns the default config if the file doesn't exist. A corrupted
    /// file is backed up and replaced with defaults instead of blocking
    /// startup.
    pub async fn load(&self) -> Result<AppConfig, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => Ok(config),
                Err(e) => {
                    tracing::warn!("Config file corrupted: {}", e);

                    match self.backup().await {
                        Ok(backup_path) => {
                            tracing::warn!(
                                "Corrupted config backed up to {:?}, using defaults",
                                backup_path
                            );
                        }
                        Err(backup_err) => {
                            tracing::error!("Failed to backup corrupted config: {}", backup_err);
                        }
                    }

                    Ok(AppConfig::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Save the config to disk
    pub async fn save(&self, config: &AppConfig) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        // Write to temp file first, then rename (atomic write)
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }

    /// Check if the config file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Create a timestamped backup of the current config
    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }

        Ok(backup_path)
    }
}
