//! SSH connection and shell session handling

pub mod client;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod shell;

pub use client::{ClientHandler, SshClient};
pub use error::SshError;
pub use registry::{ShellHandle, ShellRegistry};
pub use shell::{
    open_shell, parse_command, SessionCommand, TermMessage, TerminalSize, CMD_CLOSE, CMD_DATA,
    CMD_RESIZE,
};
