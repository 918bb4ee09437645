//! Interactive shell commands

use std::sync::Arc;

use tauri::ipc::Channel as IpcChannel;
use tauri::State;
use tracing::info;

use crate::server::ServerState;
use crate::ssh::{
    open_shell, parse_command, SessionCommand, ShellRegistry, SshClient, SshError, TermMessage,
    TerminalSize,
};

use super::CommandError;

/// Open a shell session to a saved server
///
/// Returns the channel id the frontend uses for `ssh_send` / `ssh_close`.
/// Terminal output arrives on `on_message`.
#[tauri::command]
pub async fn ssh_connect(
    id: String,
    on_message: IpcChannel<TermMessage>,
    servers: State<'_, Arc<ServerState>>,
    registry: State<'_, Arc<ShellRegistry>>,
) -> Result<u32, CommandError> {
    let (server, config) = servers.connection_params(&id)?;

    info!("Opening shell to server entry {}", id);

    let handle = SshClient::new(server, &config).connect().await?;

    let chan_id = registry.next_id();
    open_shell(
        handle,
        chan_id,
        TerminalSize::default(),
        on_message,
        registry.inner().clone(),
    )
    .await?;

    Ok(chan_id)
}

/// Feed input or a resize into a running shell session
#[tauri::command]
pub async fn ssh_send(
    id: u32,
    msg: TermMessage,
    registry: State<'_, Arc<ShellRegistry>>,
) -> Result<(), CommandError> {
    let tx = registry.cmd_tx(id).ok_or(SshError::ChannelNotFound(id))?;
    let cmd = parse_command(msg)?;

    tx.send(cmd)
        .await
        .map_err(|_| SshError::ChannelNotFound(id))?;
    Ok(())
}

/// Close a shell session; closing an unknown id is a no-op
#[tauri::command]
pub async fn ssh_close(
    id: u32,
    registry: State<'_, Arc<ShellRegistry>>,
) -> Result<(), CommandError> {
    if let Some(tx) = registry.cmd_tx(id) {
        registry.remove(id);
        let _ = tx.send(SessionCommand::Close).await;
    }
    Ok(())
}
