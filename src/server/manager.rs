//! Server store state and CRUD operations
//!
//! Holds the unlocked server map and the application config behind one
//! lock. Mutations persist to disk before returning so the frontend never
//! observes a change that could be lost on exit.

use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::storage::{config_file, servers_file, ConfigStorage, StorageError};
use super::types::{config_slot, AppConfig, ServerDetail, ServerGroup, ServerItem};
use super::vault::{ServerVault, VaultError, VaultKey};

/// Server store errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server store is locked, log in first")]
    Locked,

    #[error("Server not found: {0}")]
    NotFound(String),

    #[error("Server already exists: {0}")]
    Duplicate(String),

    #[error("Invalid server id: {0}")]
    InvalidId(String),

    #[error("Invalid config slot: {0}")]
    InvalidSlot(u32),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl serde::Serialize for ServerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Deterministic id for a server entry
///
/// Derived from the lowercased "group/name" key so renaming a server (or
/// moving it between groups) changes its id, and re-adding the same entry
/// always yields the same one.
pub fn server_id(server: &ServerDetail) -> u32 {
    let digest = Sha256::digest(server.store_key().as_bytes());
    u32::from_le_bytes(digest[..4].try_into().expect("digest is 32 bytes"))
}

fn parse_id(id: &str) -> Result<u32, ServerError> {
    id.parse::<u32>()
        .map_err(|_| ServerError::InvalidId(id.to_string()))
}

struct Inner {
    config: AppConfig,
    key: Option<VaultKey>,
    servers: BTreeMap<u32, ServerDetail>,
}

/// Managed state for saved servers and application config
pub struct ServerState {
    storage: ConfigStorage,
    vault: ServerVault,
    inner: RwLock<Inner>,
    /// Serializes config writes; concurrent saves share one temp file path
    save_lock: tokio::sync::Mutex<()>,
}

impl ServerState {
    /// Create the state with default on-disk paths and load the config
    pub async fn new() -> Result<Self, ServerError> {
        Self::with_paths(config_file()?, servers_file()?).await
    }

    /// Create the state with explicit paths (for testing)
    pub async fn with_paths(
        config_path: PathBuf,
        vault_path: PathBuf,
    ) -> Result<Self, ServerError> {
        let storage = ConfigStorage::with_path(config_path);
        let config = storage.load().await?;

        Ok(Self {
            storage,
            vault: ServerVault::new(vault_path),
            inner: RwLock::new(Inner {
                config,
                key: None,
                servers: BTreeMap::new(),
            }),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Unlock the encrypted server store
    pub fn login(&self, name: &str, password: &str) -> Result<(), ServerError> {
        let (key, servers) = self.vault.unlock(name, password)?;

        let mut inner = self.inner.write();
        inner.key = Some(key);
        inner.servers = servers;
        Ok(())
    }

    /// All servers grouped by group name, groups and entries sorted by name
    pub fn list_groups(&self) -> Vec<ServerGroup> {
        let inner = self.inner.read();

        let mut groups: BTreeMap<String, BTreeMap<String, ServerItem>> = BTreeMap::new();
        for (id, server) in &inner.servers {
            groups.entry(server.group.clone()).or_default().insert(
                server.name.clone(),
                ServerItem {
                    id: id.to_string(),
                    name: server.name.clone(),
                },
            );
        }

        groups
            .into_iter()
            .map(|(name, servers)| ServerGroup {
                name,
                servers: servers.into_values().collect(),
            })
            .collect()
    }

    /// Add a new server entry
    ///
    /// Refuses entries whose group/name pair (case-insensitive) is already
    /// taken. Returns the id assigned to the entry.
    pub fn add_server(&self, server: ServerDetail) -> Result<u32, ServerError> {
        let id = server_id(&server);

        let mut inner = self.inner.write();
        if inner.servers.contains_key(&id) {
            return Err(ServerError::Duplicate(server.store_key()));
        }
        inner.servers.insert(id, server);
        self.persist(&inner)?;
        Ok(id)
    }

    /// Replace the entry at `id` with `server`
    ///
    /// A rename moves the entry to its new id; the frontend relists after
    /// an update so the id change is picked up.
    pub fn update_server(&self, id: &str, server: ServerDetail) -> Result<u32, ServerError> {
        let old_id = parse_id(id)?;
        let new_id = server_id(&server);

        let mut inner = self.inner.write();
        if !inner.servers.contains_key(&old_id) {
            return Err(ServerError::NotFound(id.to_string()));
        }
        if new_id != old_id {
            if inner.servers.contains_key(&new_id) {
                return Err(ServerError::Duplicate(server.store_key()));
            }
            inner.servers.remove(&old_id);
        }
        inner.servers.insert(new_id, server);
        self.persist(&inner)?;
        Ok(new_id)
    }

    /// Delete the entry at `id`; deleting an unknown id is a no-op
    pub fn del_server(&self, id: &str) -> Result<(), ServerError> {
        let id = parse_id(id)?;

        let mut inner = self.inner.write();
        if inner.servers.remove(&id).is_some() {
            self.persist(&inner)?;
        }
        Ok(())
    }

    /// Full detail of a single entry (for the edit dialog)
    pub fn server_detail(&self, id: &str) -> Result<ServerDetail, ServerError> {
        let id_num = parse_id(id)?;
        let inner = self.inner.read();
        inner
            .servers
            .get(&id_num)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()))
    }

    /// Everything needed to open a connection to `id`
    pub fn connection_params(&self, id: &str) -> Result<(ServerDetail, AppConfig), ServerError> {
        let id_num = parse_id(id)?;
        let inner = self.inner.read();
        let server = inner
            .servers
            .get(&id_num)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        Ok((server, inner.config.clone()))
    }

    /// Current config snapshot
    pub fn config_snapshot(&self) -> AppConfig {
        self.inner.read().config.clone()
    }

    /// Update one config slot from its wire representation
    ///
    /// String slots take the value verbatim; list slots expect a JSON array
    /// of strings.
    pub fn set_config(&self, slot: u32, value: &str) -> Result<(), ServerError> {
        let mut inner = self.inner.write();
        match slot {
            config_slot::LOCAL_PATH => inner.config.local_path = value.to_string(),
            config_slot::REMOTE_PATH => inner.config.remote_path = value.to_string(),
            config_slot::FILE_NAME => inner.config.file_name = value.to_string(),
            config_slot::EXPAND_LIST => inner.config.expand_list = serde_json::from_str(value)?,
            config_slot::LOCAL_GRPS => inner.config.local_grps = serde_json::from_str(value)?,
            config_slot::REMOTE_GRPS => inner.config.remote_grps = serde_json::from_str(value)?,
            config_slot::FILE_GRPS => inner.config.file_grps = serde_json::from_str(value)?,
            other => return Err(ServerError::InvalidSlot(other)),
        }
        Ok(())
    }

    /// Write the current config to disk
    ///
    /// Saves are serialized and the snapshot is taken under the save lock,
    /// so a slow write can neither tear the file nor clobber a newer save
    /// with stale contents.
    pub async fn save_config(&self) -> Result<(), ServerError> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.config_snapshot();
        self.storage.save(&snapshot).await?;
        Ok(())
    }

    fn persist(&self, inner: &Inner) -> Result<(), ServerError> {
        let key = inner.key.as_ref().ok_or(ServerError::Locked)?;
        self.vault.save(key, &inner.servers)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn server(group: &str, name: &str) -> ServerDetail {
        ServerDetail {
            name: name.to_string(),
            group: group.to_string(),
            host: "example.com".to_string(),
            port: 22,
            username: "admin".to_string(),
            password: "pw".to_string(),
            ..Default::default()
        }
    }

    async fn unlocked_state(dir: &TempDir) -> ServerState {
        let state = ServerState::with_paths(
            dir.path().join("config.json"),
            dir.path().join("servers.dat"),
        )
        .await
        .unwrap();
        state.login("alice", "pw").unwrap();
        state
    }

    #[test]
    fn test_server_id_stable_and_case_insensitive() {
        let a = server("Prod", "Web-01");
        let b = server("prod", "web-01");
        assert_eq!(server_id(&a), server_id(&b));

        let c = server("prod", "web-02");
        assert_ne!(server_id(&a), server_id(&c));
    }

    #[tokio::test]
    async fn test_add_duplicate_rejected() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        state.add_server(server("Default", "alpha")).unwrap();
        let result = state.add_server(server("default", "ALPHA"));
        assert!(matches!(result, Err(ServerError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_add_without_login_is_locked() {
        let dir = tempdir().unwrap();
        let state = ServerState::with_paths(
            dir.path().join("config.json"),
            dir.path().join("servers.dat"),
        )
        .await
        .unwrap();

        let result = state.add_server(server("Default", "alpha"));
        assert!(matches!(result, Err(ServerError::Locked)));
    }

    #[tokio::test]
    async fn test_listing_grouped_and_sorted() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        state.add_server(server("Prod", "zeta")).unwrap();
        state.add_server(server("Prod", "alpha")).unwrap();
        state.add_server(server("Dev", "box")).unwrap();

        let groups = state.list_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Dev");
        assert_eq!(groups[1].name, "Prod");
        assert_eq!(groups[1].servers[0].name, "alpha");
        assert_eq!(groups[1].servers[1].name, "zeta");
    }

    #[tokio::test]
    async fn test_update_rename_moves_id() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        let old_id = state.add_server(server("Default", "alpha")).unwrap();
        let new_id = state
            .update_server(&old_id.to_string(), server("Default", "beta"))
            .unwrap();

        assert_ne!(old_id, new_id);
        assert!(state.server_detail(&old_id.to_string()).is_err());
        assert_eq!(
            state.server_detail(&new_id.to_string()).unwrap().name,
            "beta"
        );
    }

    #[tokio::test]
    async fn test_update_rename_collision_rejected() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        let alpha = state.add_server(server("Default", "alpha")).unwrap();
        state.add_server(server("Default", "beta")).unwrap();

        let result = state.update_server(&alpha.to_string(), server("Default", "beta"));
        assert!(matches!(result, Err(ServerError::Duplicate(_))));
        // The existing entry is untouched
        assert_eq!(
            state.server_detail(&alpha.to_string()).unwrap().name,
            "alpha"
        );
    }

    #[tokio::test]
    async fn test_del_unknown_is_noop() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        state.del_server("12345").unwrap();
        assert!(matches!(
            state.del_server("not-a-number"),
            Err(ServerError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_servers_survive_relogin() {
        let dir = tempdir().unwrap();
        let id;
        {
            let state = unlocked_state(&dir).await;
            id = state.add_server(server("Default", "alpha")).unwrap();
        }

        let state = unlocked_state(&dir).await;
        assert_eq!(state.server_detail(&id.to_string()).unwrap().name, "alpha");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_config_saves_stay_intact() {
        let dir = tempdir().unwrap();
        let state = std::sync::Arc::new(unlocked_state(&dir).await);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                state
                    .set_config(config_slot::LOCAL_PATH, &format!("/tmp/{}", i))
                    .unwrap();
                state.save_config().await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        // A torn write would fail to parse and fall back to defaults
        let storage = ConfigStorage::with_path(dir.path().join("config.json"));
        let cfg = storage.load().await.unwrap();
        assert!(cfg.local_path.starts_with("/tmp/"));

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            let name = e.file_name().to_string_lossy().to_string();
            assert!(!name.contains("backup"), "corrupted config was backed up");
        }
    }

    #[tokio::test]
    async fn test_set_config_slots() {
        let dir = tempdir().unwrap();
        let state = unlocked_state(&dir).await;

        state.set_config(config_slot::LOCAL_PATH, "/tmp").unwrap();
        state
            .set_config(config_slot::EXPAND_LIST, r#"["Default","Work"]"#)
            .unwrap();

        let cfg = state.config_snapshot();
        assert_eq!(cfg.local_path, "/tmp");
        assert_eq!(cfg.expand_list, vec!["Default", "Work"]);

        assert!(matches!(
            state.set_config(99, "x"),
            Err(ServerError::InvalidSlot(99))
        ));
        assert!(state.set_config(config_slot::EXPAND_LIST, "not json").is_err());
    }
}
