//! Interactive shell sessions
//!
//! One pump task per shell owns the SSH handle and channel. Output flows
//! to the frontend through a tauri IPC channel as `TermMessage` values;
//! input, resizes and closes come back through an mpsc command channel.

use std::sync::Arc;

use russh::client::Handle;
use russh::ChannelMsg;
use serde::{Deserialize, Serialize};
use tauri::ipc::Channel as IpcChannel;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::client::ClientHandler;
use super::error::SshError;
use super::registry::{ShellHandle, ShellRegistry};

/// Terminal output payload
pub const CMD_DATA: i32 = 0;
/// Terminal resize request
pub const CMD_RESIZE: i32 = 1;
/// Session closed notification
pub const CMD_CLOSE: i32 = 2;

/// Message exchanged with the terminal frontend
///
/// `code` selects the meaning of `data`: terminal bytes for `CMD_DATA`,
/// a JSON-encoded [`TerminalSize`] for `CMD_RESIZE`, and the channel id
/// for `CMD_CLOSE`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TermMessage {
    pub code: i32,
    pub data: String,
}

/// PTY dimensions, in characters and pixels
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for TerminalSize {
    /// Initial PTY size; the frontend sends a real resize right after connect
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            width: 0,
            height: 0,
        }
    }
}

/// Commands accepted by a running shell session
#[derive(Debug)]
pub enum SessionCommand {
    /// Bytes for the remote stdin
    Data(Vec<u8>),
    /// Resize the remote PTY
    Resize(TerminalSize),
    /// Close the session
    Close,
}

/// Translate a frontend message into a session command
///
/// Only data and resize messages are accepted here; closing a session
/// goes through its own command, so a close code on this path is unknown.
pub fn parse_command(msg: TermMessage) -> Result<SessionCommand, SshError> {
    match msg.code {
        CMD_DATA => Ok(SessionCommand::Data(msg.data.into_bytes())),
        CMD_RESIZE => {
            let size: TerminalSize = serde_json::from_str(&msg.data)
                .map_err(|e| SshError::InvalidResizePayload(e.to_string()))?;
            Ok(SessionCommand::Resize(size))
        }
        other => Err(SshError::UnknownMessageCode(other)),
    }
}

/// Number of trailing bytes that start a multi-byte sequence the next
/// chunk will finish
///
/// Only the last three bytes can belong to an unfinished sequence. A lead
/// byte in that window whose sequence overruns the chunk end is held back;
/// anything else (including byte values that can never lead a sequence)
/// has nothing to wait for.
fn incomplete_tail_len(data: &[u8]) -> usize {
    let window = data.len().saturating_sub(3);
    for i in (window..data.len()).rev() {
        let b = data[i];
        if b < 0x80 {
            return 0;
        }
        if b >= 0xC0 {
            let need = match b {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return 0,
            };
            let have = data.len() - i;
            return if have < need { have } else { 0 };
        }
        // continuation byte, keep scanning back
    }
    0
}

/// Length of the longest prefix that ends on a character boundary
///
/// SSH delivers output in arbitrary byte chunks, so a multi-byte UTF-8
/// sequence can be split across two chunks. The incomplete tail is held
/// back and prepended to the next chunk. Bytes that are invalid UTF-8
/// outright (not just truncated) pass through and are replaced lossily.
fn complete_prefix_len(data: &[u8]) -> usize {
    data.len() - incomplete_tail_len(data)
}

/// Open a PTY + shell on an authenticated handle and start its pump task
///
/// The handle moves into the pump task so the connection lives exactly as
/// long as the shell. The session is registered under `id` before this
/// returns; the pump removes it again when the loop ends.
pub async fn open_shell(
    handle: Handle<ClientHandler>,
    id: u32,
    size: TerminalSize,
    on_message: IpcChannel<TermMessage>,
    registry: Arc<ShellRegistry>,
) -> Result<(), SshError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| SshError::ChannelError(format!("Failed to open channel: {}", e)))?;

    debug!("Channel opened for session {}, requesting PTY", id);

    channel
        .request_pty(
            false,
            "xterm",
            size.cols,
            size.rows,
            size.width,
            size.height,
            &[],
        )
        .await
        .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;

    channel
        .request_shell(false)
        .await
        .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

    info!("Interactive shell started for session {}", id);

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(1024);
    registry.insert(id, ShellHandle { cmd_tx });

    tokio::spawn(async move {
        // The connection closes when this task drops the handle
        let _handle = handle;
        let mut carry: Vec<u8> = Vec::new();

        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        SessionCommand::Data(data) => {
                            if let Err(e) = channel.data(&data[..]).await {
                                error!("Failed to send data on session {}: {}", id, e);
                                break;
                            }
                        }
                        SessionCommand::Resize(size) => {
                            debug!(
                                "Resizing session {} to {}x{}",
                                id, size.cols, size.rows
                            );
                            if let Err(e) = channel
                                .window_change(size.cols, size.rows, size.width, size.height)
                                .await
                            {
                                error!("Failed to resize PTY on session {}: {}", id, e);
                            }
                        }
                        SessionCommand::Close => {
                            info!("Close requested for session {}", id);
                            let _ = channel.eof().await;
                            break;
                        }
                    }
                }

                Some(msg) = channel.wait() => {
                    match msg {
                        ChannelMsg::Data { data } => {
                            if !emit_output(&on_message, &mut carry, &data) {
                                break;
                            }
                        }
                        ChannelMsg::ExtendedData { data, ext } => {
                            // stderr is merged into the terminal stream
                            if ext == 1 && !emit_output(&on_message, &mut carry, &data) {
                                break;
                            }
                        }
                        ChannelMsg::Eof => {
                            info!("Channel EOF on session {}", id);
                            break;
                        }
                        ChannelMsg::Close => {
                            info!("Channel closed on session {}", id);
                            break;
                        }
                        ChannelMsg::ExitStatus { exit_status } => {
                            info!("Session {} exit status {}", id, exit_status);
                        }
                        ChannelMsg::ExitSignal { signal_name, .. } => {
                            info!("Session {} exit signal {:?}", id, signal_name);
                        }
                        _ => {}
                    }
                }

                else => {
                    debug!("Pump loop for session {} drained", id);
                    break;
                }
            }
        }

        // Flush any held-back bytes, then tell the frontend the session is gone
        if !carry.is_empty() {
            let _ = on_message.send(TermMessage {
                code: CMD_DATA,
                data: String::from_utf8_lossy(&carry).into_owned(),
            });
        }
        let _ = on_message.send(TermMessage {
            code: CMD_CLOSE,
            data: id.to_string(),
        });

        registry.remove(id);
        info!("Session {} terminated", id);
    });

    Ok(())
}

/// Forward one output chunk, holding back a split UTF-8 tail
///
/// Returns false when the frontend channel is gone.
fn emit_output(
    on_message: &IpcChannel<TermMessage>,
    carry: &mut Vec<u8>,
    data: &[u8],
) -> bool {
    carry.extend_from_slice(data);
    let n = complete_prefix_len(carry);
    if n == 0 {
        return true;
    }

    let text = String::from_utf8_lossy(&carry[..n]).into_owned();
    carry.drain(..n);

    if let Err(e) = on_message.send(TermMessage {
        code: CMD_DATA,
        data: text,
    }) {
        error!("Failed to deliver terminal output: {}", e);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_prefix_ascii() {
        assert_eq!(complete_prefix_len(b"hello"), 5);
        assert_eq!(complete_prefix_len(b""), 0);
    }

    #[test]
    fn test_complete_prefix_holds_back_split_char() {
        // U+4E2D is three bytes: e4 b8 ad
        let full = "ab\u{4e2d}".as_bytes();
        assert_eq!(complete_prefix_len(full), 5);

        // Chunk boundary inside the multi-byte sequence
        assert_eq!(complete_prefix_len(&full[..3]), 2);
        assert_eq!(complete_prefix_len(&full[..4]), 2);
    }

    #[test]
    fn test_complete_prefix_trailing_four_byte_char() {
        // U+1F600 is four bytes
        let full = "x\u{1f600}".as_bytes();
        assert_eq!(full.len(), 5);
        assert_eq!(complete_prefix_len(&full[..2]), 1);
        assert_eq!(complete_prefix_len(&full[..4]), 1);
        assert_eq!(complete_prefix_len(full), 5);
    }

    #[test]
    fn test_invalid_bytes_pass_through() {
        // 0xFF can never start a sequence, nothing to wait for
        let data = [b'a', 0xFF, b'b'];
        assert_eq!(complete_prefix_len(&data), 3);
        assert_eq!(complete_prefix_len(&[b'a', 0xFF]), 2);
    }

    #[test]
    fn test_split_tail_held_back_after_invalid_byte() {
        // An invalid byte earlier in the chunk must not flush a
        // truncated sequence at the end
        let data = [0xFF, 0xE4, 0xB8];
        assert_eq!(complete_prefix_len(&data), 1);

        let data = [b'a', 0xFF, b'b', 0xF0, 0x9F];
        assert_eq!(complete_prefix_len(&data), 3);
    }

    #[test]
    fn test_parse_command_data_and_resize() {
        let cmd = parse_command(TermMessage {
            code: CMD_DATA,
            data: "ls\r".to_string(),
        })
        .unwrap();
        assert!(matches!(cmd, SessionCommand::Data(ref b) if b == b"ls\r"));

        let cmd = parse_command(TermMessage {
            code: CMD_RESIZE,
            data: r#"{"cols":120,"rows":40,"width":960,"height":640}"#.to_string(),
        })
        .unwrap();
        assert!(matches!(cmd, SessionCommand::Resize(s) if s.cols == 120 && s.rows == 40));
    }

    #[test]
    fn test_parse_command_rejects_close_code() {
        let result = parse_command(TermMessage {
            code: CMD_CLOSE,
            data: "100".to_string(),
        });
        assert!(matches!(result, Err(SshError::UnknownMessageCode(2))));
    }

    #[test]
    fn test_parse_command_rejects_unknown_code() {
        let result = parse_command(TermMessage {
            code: 7,
            data: String::new(),
        });
        assert!(matches!(result, Err(SshError::UnknownMessageCode(7))));
    }

    #[test]
    fn test_parse_command_malformed_resize() {
        let result = parse_command(TermMessage {
            code: CMD_RESIZE,
            data: "not json".to_string(),
        });
        assert!(matches!(result, Err(SshError::InvalidResizePayload(_))));
    }

    #[test]
    fn test_resize_payload_parses() {
        let size: TerminalSize =
            serde_json::from_str(r#"{"cols":120,"rows":40,"width":960,"height":640}"#).unwrap();
        assert_eq!(size.cols, 120);
        assert_eq!(size.rows, 40);
        assert_eq!(size.width, 960);
        assert_eq!(size.height, 640);
    }
}
