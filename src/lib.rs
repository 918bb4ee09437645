//! MTTY - A lightweight SSH/SFTP client
//!
//! Built with Rust, Tauri, and xterm.js.

// Use mimalloc as the global allocator for better performance
// with high-frequency small allocations (terminal output chunks)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod commands;
pub mod server;
pub mod sftp;
pub mod ssh;

use std::sync::Arc;

use tauri::Manager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use server::ServerState;
use ssh::ShellRegistry;

/// Initialize logging
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();

    tracing::info!("Starting MTTY...");

    let shell_registry = Arc::new(ShellRegistry::new());

    tauri::Builder::default()
        .manage(shell_registry)
        .setup(|app| {
            // Load the config synchronously so commands never race startup
            let server_state = tauri::async_runtime::block_on(ServerState::new())?;
            app.manage(Arc::new(server_state));
            tracing::info!("Server state initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Server store and config commands
            commands::server::ssh_login,
            commands::server::ssh_get_servers,
            commands::server::ssh_add_server,
            commands::server::ssh_update_server,
            commands::server::ssh_del_server,
            commands::server::ssh_server_detail,
            commands::server::ssh_config_all,
            commands::server::ssh_set_config,
            // Shell commands
            commands::shell::ssh_connect,
            commands::shell::ssh_send,
            commands::shell::ssh_close,
            // File transfer commands
            commands::transfer::ssh_upload,
            commands::transfer::ssh_download,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
