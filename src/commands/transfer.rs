//! File transfer commands
//!
//! Each transfer opens its own SSH connection so a stuck transfer never
//! blocks the interactive shell. Progress is broadcast to the window as
//! `tauri://FileTransferMessage` events.

use std::sync::Arc;

use tauri::{Emitter, State, Window};
use tokio::sync::mpsc;
use tracing::warn;

use crate::server::ServerState;
use crate::sftp::{download_file, open_sftp, upload_file, TransferProgress};
use crate::ssh::SshClient;

use super::CommandError;

/// Event name the frontend listens on for transfer progress
pub const TRANSFER_EVENT: &str = "tauri://FileTransferMessage";

fn emit_progress(window: &Window, rate: u64, message: String) {
    if let Err(e) = window.emit(TRANSFER_EVENT, TransferProgress { rate, message }) {
        warn!("Failed to emit transfer progress: {}", e);
    }
}

/// Forward progress updates from a transfer task to the window
fn spawn_forwarder(window: Window) -> mpsc::Sender<TransferProgress> {
    let (tx, mut rx) = mpsc::channel::<TransferProgress>(64);
    tauri::async_runtime::spawn(async move {
        while let Some(p) = rx.recv().await {
            if let Err(e) = window.emit(TRANSFER_EVENT, p) {
                warn!("Failed to emit transfer progress: {}", e);
                break;
            }
        }
    });
    tx
}

/// Upload one local file into a remote directory on a saved server
#[tauri::command]
pub async fn ssh_upload(
    id: String,
    local_path: String,
    remote_path: String,
    window: Window,
    servers: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    let (server, config) = servers.connection_params(&id)?;

    emit_progress(
        &window,
        0,
        format!("Connecting to {}:{}", server.host, server.port),
    );

    let handle = SshClient::new(server, &config).connect().await?;
    emit_progress(&window, 0, "Connected".to_string());

    let sftp = open_sftp(&handle).await?;

    let progress = spawn_forwarder(window);
    upload_file(&sftp, &local_path, &remote_path, &progress).await?;
    Ok(())
}

/// Download one remote file into a local directory from a saved server
#[tauri::command]
pub async fn ssh_download(
    id: String,
    local_path: String,
    remote_path: String,
    window: Window,
    servers: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    let (server, config) = servers.connection_params(&id)?;

    emit_progress(
        &window,
        0,
        format!("Connecting to {}:{}", server.host, server.port),
    );

    let handle = SshClient::new(server, &config).connect().await?;
    emit_progress(&window, 0, "Connected".to_string());

    let sftp = open_sftp(&handle).await?;

    let progress = spawn_forwarder(window);
    download_file(&sftp, &local_path, &remote_path, &progress).await?;
    Ok(())
}
