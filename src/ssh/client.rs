//! SSH client connection setup using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::server::{AppConfig, ServerDetail};

use super::error::SshError;
use super::proxy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// SSH client holding the parameters for one outgoing connection
pub struct SshClient {
    server: ServerDetail,
    proxy_addr: String,
}

impl SshClient {
    pub fn new(server: ServerDetail, config: &AppConfig) -> Self {
        Self {
            server,
            proxy_addr: config.proxy_addr.clone(),
        }
    }

    /// Connect and authenticate, returning the authenticated handle
    pub async fn connect(self) -> Result<Handle<ClientHandler>, SshError> {
        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(60)),
            keepalive_max: 3,
            ..Default::default()
        };
        let ssh_config = Arc::new(ssh_config);

        let handler = ClientHandler::new(self.server.host.clone(), self.server.port);

        let use_proxy = self.server.use_proxy && !self.proxy_addr.is_empty();
        let mut handle = if use_proxy {
            let stream = proxy::http_connect(
                &self.proxy_addr,
                &self.server.host,
                self.server.port,
                CONNECT_TIMEOUT,
            )
            .await?;

            tokio::time::timeout(
                CONNECT_TIMEOUT,
                client::connect_stream(ssh_config, stream, handler),
            )
            .await
            .map_err(|_| SshError::Timeout("SSH handshake timed out".to_string()))?
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?
        } else {
            let addr = format!("{}:{}", self.server.host, self.server.port);
            let socket_addr = addr
                .to_socket_addrs()
                .map_err(|e| {
                    SshError::ConnectionFailed(format!("Failed to resolve {}: {}", addr, e))
                })?
                .next()
                .ok_or_else(|| {
                    SshError::ConnectionFailed(format!("No address found for {}", addr))
                })?;

            info!("Connecting to SSH server at {}", addr);

            tokio::time::timeout(
                CONNECT_TIMEOUT,
                client::connect(ssh_config, socket_addr, handler),
            )
            .await
            .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", addr)))?
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?
        };

        debug!("SSH handshake completed");

        let authenticated = if !self.server.cert_path.is_empty() {
            let passphrase = if self.server.cert_pass.is_empty() {
                None
            } else {
                Some(self.server.cert_pass.as_str())
            };
            let key = russh::keys::load_secret_key(&self.server.cert_path, passphrase)
                .map_err(|e| SshError::KeyError(e.to_string()))?;

            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

            handle
                .authenticate_publickey(&self.server.username, key_with_hash)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
        } else {
            handle
                .authenticate_password(&self.server.username, &self.server.password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!(
            "SSH authentication successful for {}@{}",
            self.server.username, self.server.host
        );

        Ok(handle)
    }
}

/// Client handler for russh callbacks
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let digest = Sha256::digest(server_public_key.public_key_bytes());
        let fingerprint: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        info!(
            "Host key for {}:{}: SHA256 {}",
            self.host, self.port, fingerprint
        );
        Ok(true)
    }
}
