//! Encrypted server store
//!
//! The server list (including passwords) lives in a single encrypted file.
//! Layout: magic + version header, Argon2id salt, ChaCha20-Poly1305 nonce,
//! then ciphertext with the 16-byte authentication tag appended. The key is
//! derived from the login name and master password; a wrong password fails
//! AEAD verification rather than any explicit check.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::types::ServerDetail;

/// Magic number identifying MTTY store files
const MAGIC: &[u8; 5] = b"MTTY1";

/// Current store format version
const STORE_VERSION: u32 = 1;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + 4 + SALT_LEN + NONCE_LEN;

/// Server store errors
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid store file format: {0}")]
    InvalidFormat(String),

    #[error("Not an MTTY store file")]
    InvalidMagic,

    #[error("Store version {0} is newer than supported")]
    UnsupportedVersion(u32),

    #[error("Key derivation failed")]
    KdfFailed,

    #[error("Invalid username or password")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Key material retained while the store is unlocked
///
/// The salt is kept so subsequent saves reuse it and the master password
/// keeps working across restarts.
pub struct VaultKey {
    key: Zeroizing<[u8; 32]>,
    salt: [u8; 32],
}

/// Derive the store key from login name + master password using Argon2id
///
/// The lowercased name is folded into the KDF input so the name/password
/// pair forms the credential, not the password alone.
fn derive_key(name: &str, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    // 64 MB, 3 iterations, parallelism=4: interactive-login cost
    let params = Params::new(65536, 3, 4, Some(32)).map_err(|_| VaultError::KdfFailed)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let secret = Zeroizing::new(format!("{}\n{}", name.to_lowercase(), password));

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut *key)
        .map_err(|_| VaultError::KdfFailed)?;

    Ok(key)
}

/// The on-disk encrypted server store
pub struct ServerVault {
    path: PathBuf,
}

impl ServerVault {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Unlock the store with the given credentials
    ///
    /// If the store file doesn't exist yet, any credentials are accepted and
    /// an empty server map is returned; the first save creates the file.
    pub fn unlock(
        &self,
        name: &str,
        password: &str,
    ) -> Result<(VaultKey, BTreeMap<u32, ServerDetail>), VaultError> {
        if !self.exists() {
            let mut salt = [0u8; SALT_LEN];
            rand::rngs::OsRng.fill_bytes(&mut salt);
            let key = derive_key(name, password, &salt)?;
            tracing::info!("Server store not found, starting fresh");
            return Ok((VaultKey { key, salt }, BTreeMap::new()));
        }

        let data = fs::read(&self.path)?;
        if data.len() < HEADER_LEN {
            return Err(VaultError::InvalidFormat("file too short".to_string()));
        }

        if &data[..MAGIC.len()] != MAGIC {
            return Err(VaultError::InvalidMagic);
        }

        let version = u32::from_le_bytes(
            data[MAGIC.len()..MAGIC.len() + 4]
                .try_into()
                .expect("fixed slice"),
        );
        if version > STORE_VERSION {
            return Err(VaultError::UnsupportedVersion(version));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[MAGIC.len() + 4..MAGIC.len() + 4 + SALT_LEN]);

        let nonce_start = MAGIC.len() + 4 + SALT_LEN;
        let nonce = Nonce::from_slice(&data[nonce_start..nonce_start + NONCE_LEN]);

        let key = derive_key(name, password, &salt)?;

        let cipher =
            ChaCha20Poly1305::new_from_slice(&*key).map_err(|_| VaultError::KdfFailed)?;

        let plaintext = cipher
            .decrypt(nonce, &data[HEADER_LEN..])
            .map_err(|_| VaultError::DecryptionFailed)?;

        let servers: BTreeMap<u32, ServerDetail> = serde_json::from_slice(&plaintext)?;
        tracing::info!("Server store unlocked, {} entries", servers.len());

        Ok((VaultKey { key, salt }, servers))
    }

    /// Encrypt and persist the server map
    pub fn save(
        &self,
        key: &VaultKey,
        servers: &BTreeMap<u32, ServerDetail>,
    ) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let plaintext = Zeroizing::new(serde_json::to_vec(servers)?);

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let cipher =
            ChaCha20Poly1305::new_from_slice(&*key.key).map_err(|_| VaultError::KdfFailed)?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut file_data = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        file_data.extend_from_slice(MAGIC);
        file_data.extend_from_slice(&STORE_VERSION.to_le_bytes());
        file_data.extend_from_slice(&key.salt);
        file_data.extend_from_slice(&nonce);
        file_data.extend_from_slice(&ciphertext);

        // Write atomically: temp file then rename
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&file_data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_servers() -> BTreeMap<u32, ServerDetail> {
        let mut m = BTreeMap::new();
        m.insert(
            42,
            ServerDetail {
                name: "web-01".to_string(),
                group: "Default".to_string(),
                host: "example.com".to_string(),
                port: 22,
                username: "admin".to_string(),
                password: "secret123".to_string(),
                ..Default::default()
            },
        );
        m
    }

    #[test]
    fn test_unlock_missing_file_starts_fresh() {
        let temp = tempdir().unwrap();
        let vault = ServerVault::new(temp.path().join("servers.dat"));

        let (_key, servers) = vault.unlock("alice", "pw").unwrap();
        assert!(servers.is_empty());
        assert!(!vault.exists());
    }

    #[test]
    fn test_save_and_unlock_roundtrip() {
        let temp = tempdir().unwrap();
        let vault = ServerVault::new(temp.path().join("servers.dat"));

        let (key, _) = vault.unlock("alice", "pw").unwrap();
        vault.save(&key, &sample_servers()).unwrap();
        assert!(vault.exists());

        let (_key2, servers) = vault.unlock("alice", "pw").unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[&42].host, "example.com");
        assert_eq!(servers[&42].password, "secret123");
    }

    #[test]
    fn test_wrong_password_fails() {
        let temp = tempdir().unwrap();
        let vault = ServerVault::new(temp.path().join("servers.dat"));

        let (key, _) = vault.unlock("alice", "pw").unwrap();
        vault.save(&key, &sample_servers()).unwrap();

        let result = vault.unlock("alice", "wrong");
        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn test_wrong_username_fails() {
        let temp = tempdir().unwrap();
        let vault = ServerVault::new(temp.path().join("servers.dat"));

        let (key, _) = vault.unlock("alice", "pw").unwrap();
        vault.save(&key, &sample_servers()).unwrap();

        let result = vault.unlock("bob", "pw");
        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn test_tamper_detection() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("servers.dat");
        let vault = ServerVault::new(path.clone());

        let (key, _) = vault.unlock("alice", "pw").unwrap();
        vault.save(&key, &sample_servers()).unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, data).unwrap();

        let result = vault.unlock("alice", "pw");
        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn test_invalid_magic() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("servers.dat");
        fs::write(&path, vec![0u8; 128]).unwrap();

        let vault = ServerVault::new(path);
        let result = vault.unlock("alice", "pw");
        assert!(matches!(result, Err(VaultError::InvalidMagic)));
    }
}
