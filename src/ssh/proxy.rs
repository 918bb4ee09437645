//! HTTP CONNECT proxy support
//!
//! Opens a raw TCP tunnel to the SSH server through an HTTP proxy. The
//! SSH handshake then runs over the tunneled stream via
//! `client::connect_stream`.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::error::SshError;

/// Establish a tunnel to `host:port` through the HTTP proxy at `proxy_addr`
///
/// Returns the stream positioned just past the proxy's response headers,
/// ready for the SSH handshake.
pub async fn http_connect(
    proxy_addr: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, SshError> {
    info!("Connecting to {}:{} via HTTP proxy {}", host, port, proxy_addr);

    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(proxy_addr))
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to proxy {} timed out", proxy_addr)))?
        .map_err(|e| SshError::ProxyError(format!("Failed to connect to proxy: {}", e)))?;

    let request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n",
        host = host,
        port = port
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SshError::ProxyError(format!("Failed to send CONNECT: {}", e)))?;

    // Read until the end of the response headers
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    let read_headers = async {
        loop {
            let n = stream.read(&mut byte).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "proxy closed connection",
                ));
            }
            response.push(byte[0]);
            if response.ends_with(b"\r\n\r\n") {
                return Ok(());
            }
            if response.len() > 8192 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "proxy response too large",
                ));
            }
        }
    };

    tokio::time::timeout(timeout, read_headers)
        .await
        .map_err(|_| SshError::Timeout("Proxy response timed out".to_string()))?
        .map_err(|e| SshError::ProxyError(e.to_string()))?;

    let header = String::from_utf8_lossy(&response);
    let status_line = header.lines().next().unwrap_or("");
    if !status_line.contains(" 200 ") && !status_line.ends_with(" 200") {
        return Err(SshError::ProxyError(format!(
            "Proxy refused CONNECT: {}",
            status_line
        )));
    }

    debug!("Proxy tunnel established to {}:{}", host, port);
    Ok(stream)
}
