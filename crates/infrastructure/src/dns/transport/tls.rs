//! DNS-over-TLS transport (RFC 7858)
//!
//! Shares one `ClientConfig` (webpki roots, session resumption) across all
//! upstreams. Idle streams are kept in the transport's own cache.

use super::tcp::exchange_cached;
use super::{
    map_io_error, timeout_error, ConnectionCache, DnsTransport, TransportResponse,
    DEFAULT_DIAL_TIMEOUT,
};
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

static SHARED_TLS_CONFIG: LazyLock<Arc<rustls::ClientConfig>> = LazyLock::new(|| {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
});

pub struct TlsTransport {
    server_addr: SocketAddr,
    hostname: Arc<str>,
    cache: ConnectionCache<TlsStream<TcpStream>>,
    dial_timeout: Duration,
}

impl TlsTransport {
    pub fn new(server_addr: SocketAddr, hostname: Arc<str>, expire: Duration) -> Self {
        Self {
            server_addr,
            hostname,
            cache: ConnectionCache::new(expire),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn connect_new(&self, timeout: Duration) -> Result<TlsStream<TcpStream>, DomainError> {
        let connector = tokio_rustls::TlsConnector::from(SHARED_TLS_CONFIG.clone());

        let server_name = ServerName::try_from(self.hostname.to_string()).map_err(|e| {
            DomainError::ConfigError(format!("Invalid TLS server name '{}': {}", self.hostname, e))
        })?;

        let dial_timeout = timeout.min(self.dial_timeout);
        let tcp_stream = tokio::time::timeout(dial_timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| timeout_error(self.server_addr))?
            .map_err(|e| map_io_error(self.server_addr, e))?;
        tcp_stream
            .set_nodelay(true)
            .map_err(|e| map_io_error(self.server_addr, e))?;

        let tls_stream = tokio::time::timeout(dial_timeout, connector.connect(server_name, tcp_stream))
            .await
            .map_err(|_| timeout_error(self.server_addr))?
            .map_err(|e| DomainError::Transport {
                server: self.server_addr.to_string(),
                reason: format!("TLS handshake failed: {}", e),
            })?;

        debug!(server = %self.server_addr, hostname = %self.hostname, "TLS connection established");
        Ok(tls_stream)
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let (bytes, reused) = exchange_cached(
            &self.cache,
            self.server_addr,
            message_bytes,
            timeout,
            || self.connect_new(timeout),
        )
        .await?;

        debug!(
            server = %self.server_addr,
            response_len = bytes.len(),
            reused,
            "TLS response received"
        );

        Ok(TransportResponse {
            bytes,
            protocol_used: "TLS",
            reused,
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TLS"
    }

    fn close_idle(&self) {
        self.cache.clear();
    }
}
