//! Tauri command handlers

pub mod server;
pub mod shell;
pub mod transfer;

use crate::server::ServerError;
use crate::sftp::SftpError;
use crate::ssh::SshError;

/// Error type for IPC commands, serialized as its message string
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl serde::Serialize for CommandError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
