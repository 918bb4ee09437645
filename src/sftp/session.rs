//! SFTP subsystem setup

use russh::client::Handle;
use russh_sftp::client::SftpSession;
use tracing::info;

use crate::ssh::ClientHandler;

use super::error::SftpError;

/// Open the SFTP subsystem on an authenticated SSH handle
pub async fn open_sftp(handle: &Handle<ClientHandler>) -> Result<SftpSession, SftpError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| SftpError::ChannelError(e.to_string()))?;

    channel.request_subsystem(true, "sftp").await.map_err(|e| {
        SftpError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
    })?;

    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SftpError::SubsystemNotAvailable(e.to_string()))?;

    info!("SFTP subsystem opened");
    Ok(sftp)
}
