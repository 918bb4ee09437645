//! Server store module - saved servers, config, and their persistence
//!
//! The server list lives in an encrypted file unlocked by `ssh_login`;
//! the application config is plain JSON next to it.

pub mod manager;
pub mod storage;
pub mod types;
pub mod vault;

pub use manager::{server_id, ServerError, ServerState};
pub use storage::{config_file, data_dir, servers_file, ConfigStorage, StorageError};
pub use types::{config_slot, AppConfig, ServerDetail, ServerGroup, ServerItem};
pub use vault::{ServerVault, VaultError};
