//! Server store and config commands

use std::sync::Arc;

use tauri::State;

use crate::server::{AppConfig, ServerDetail, ServerGroup, ServerState};

use super::CommandError;

/// Unlock the encrypted server store
#[tauri::command]
pub async fn ssh_login(
    name: String,
    password: String,
    state: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    state.login(&name, &password)?;
    Ok(())
}

/// All saved servers, grouped for the sidebar
#[tauri::command]
pub async fn ssh_get_servers(
    state: State<'_, Arc<ServerState>>,
) -> Result<Vec<ServerGroup>, CommandError> {
    Ok(state.list_groups())
}

#[tauri::command]
pub async fn ssh_add_server(
    server: ServerDetail,
    state: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    state.add_server(server)?;
    Ok(())
}

#[tauri::command]
pub async fn ssh_update_server(
    id: String,
    server: ServerDetail,
    state: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    state.update_server(&id, server)?;
    Ok(())
}

#[tauri::command]
pub async fn ssh_del_server(
    id: String,
    state: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    state.del_server(&id)?;
    Ok(())
}

#[tauri::command]
pub async fn ssh_server_detail(
    id: String,
    state: State<'_, Arc<ServerState>>,
) -> Result<ServerDetail, CommandError> {
    Ok(state.server_detail(&id)?)
}

/// The full application config
#[tauri::command]
pub async fn ssh_config_all(
    state: State<'_, Arc<ServerState>>,
) -> Result<AppConfig, CommandError> {
    Ok(state.config_snapshot())
}

/// Update one config slot and persist the config
#[tauri::command]
pub async fn ssh_set_config(
    id: u32,
    value: String,
    state: State<'_, Arc<ServerState>>,
) -> Result<(), CommandError> {
    state.set_config(id, &value)?;
    state.save_config().await?;
    Ok(())
}
