//! Single-file SFTP transfers with progress reporting
//!
//! Uploads and downloads copy one regular file at a time in 256 KB chunks.
//! Progress is reported as a whole-number percentage and deduplicated, so
//! the frontend sees at most 100 updates per transfer plus a final summary.

use std::time::Instant;

use russh_sftp::client::SftpSession;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::info;

use super::error::SftpError;

const CHUNK_SIZE: usize = 256 * 1024;

/// One progress update for the frontend
#[derive(Clone, Debug, Serialize)]
pub struct TransferProgress {
    /// Completion percentage, 0 to 100
    pub rate: u64,
    pub message: String,
}

/// Tracks the last reported percentage so duplicates are suppressed
struct RateTracker {
    last: u64,
}

impl RateTracker {
    fn new() -> Self {
        Self { last: 0 }
    }

    /// Percentage to report for `done` of `total` bytes, or None if it
    /// hasn't changed since the last report (or `total` is zero)
    fn advance(&mut self, done: u64, total: u64) -> Option<u64> {
        if total == 0 {
            return None;
        }
        let rate = done * 100 / total;
        if rate == self.last {
            return None;
        }
        self.last = rate;
        Some(rate)
    }
}

/// File name component of a remote path
fn remote_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a file name onto a remote directory path
fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Upload one local file into a remote directory
///
/// Refuses directories; the remote file keeps the local file name.
pub async fn upload_file(
    sftp: &SftpSession,
    local_path: &str,
    remote_dir: &str,
    progress: &mpsc::Sender<TransferProgress>,
) -> Result<(), SftpError> {
    let meta = tokio::fs::metadata(local_path).await?;
    if meta.is_dir() {
        return Err(SftpError::IsDirectory(local_path.to_string()));
    }
    let total_size = meta.len();

    let file_name = std::path::Path::new(local_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let remote_file = join_remote(remote_dir, &file_name);

    info!(
        "Uploading {} ({} bytes) to {}",
        local_path, total_size, remote_file
    );

    let start = Instant::now();
    let mut src = tokio::fs::File::open(local_path).await?;
    let mut dst = sftp
        .create(remote_file.as_str())
        .await
        .map_err(|e| SftpError::ProtocolError(e.to_string()))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut tracker = RateTracker::new();
    let mut now_size: u64 = 0;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        dst.write_all(&buf[..n]).await?;
        now_size += n as u64;

        if let Some(rate) = tracker.advance(now_size, total_size) {
            let _ = progress
                .send(TransferProgress {
                    rate,
                    message: file_name.clone(),
                })
                .await;
        }
    }

    dst.shutdown().await?;

    let _ = progress
        .send(TransferProgress {
            rate: 100,
            message: format!(
                "{}, time:{} ms, size:{}",
                file_name,
                start.elapsed().as_millis(),
                total_size
            ),
        })
        .await;

    Ok(())
}

/// Download one remote file into a local directory
///
/// Refuses directories; the local file keeps the remote file name.
pub async fn download_file(
    sftp: &SftpSession,
    local_dir: &str,
    remote_path: &str,
    progress: &mpsc::Sender<TransferProgress>,
) -> Result<(), SftpError> {
    let meta = sftp
        .metadata(remote_path)
        .await
        .map_err(|e| SftpError::ProtocolError(e.to_string()))?;
    if meta.is_dir() {
        return Err(SftpError::IsDirectory(remote_path.to_string()));
    }
    let total_size = meta.size.unwrap_or_default();

    let file_name = remote_file_name(remote_path).to_string();
    let local_file = std::path::Path::new(local_dir).join(&file_name);

    info!(
        "Downloading {} ({} bytes) to {}",
        remote_path,
        total_size,
        local_file.display()
    );

    let start = Instant::now();
    let mut src = sftp
        .open(remote_path)
        .await
        .map_err(|e| SftpError::ProtocolError(e.to_string()))?;
    let mut dst = tokio::fs::File::create(&local_file).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut tracker = RateTracker::new();
    let mut now_size: u64 = 0;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        dst.write_all(&buf[..n]).await?;
        now_size += n as u64;

        if let Some(rate) = tracker.advance(now_size, total_size) {
            let _ = progress
                .send(TransferProgress {
                    rate,
                    message: file_name.clone(),
                })
                .await;
        }
    }

    dst.sync_all().await?;

    let _ = progress
        .send(TransferProgress {
            rate: 100,
            message: format!(
                "{}, time:{} ms, size:{}",
                file_name,
                start.elapsed().as_millis(),
                total_size
            ),
        })
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_tracker_dedups_repeats() {
        let mut t = RateTracker::new();
        assert_eq!(t.advance(10, 1000), Some(1));
        assert_eq!(t.advance(15, 1000), None);
        assert_eq!(t.advance(20, 1000), Some(2));
        assert_eq!(t.advance(1000, 1000), Some(100));
    }

    #[test]
    fn test_rate_tracker_zero_total() {
        let mut t = RateTracker::new();
        assert_eq!(t.advance(100, 0), None);
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(remote_file_name("/var/log/syslog"), "syslog");
        assert_eq!(remote_file_name("syslog"), "syslog");
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/home/user", "a.txt"), "/home/user/a.txt");
        assert_eq!(join_remote("/home/user/", "a.txt"), "/home/user/a.txt");
    }
}
