pub mod cache;
pub mod tcp;
#[cfg(feature = "dns-over-rustls")]
pub mod tls;
pub mod udp;

use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

pub use cache::ConnectionCache;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Vec<u8>,

    pub protocol_used: &'static str,

    /// True when the exchange ran over a connection taken from the cache.
    pub reused: bool,
}

#[async_trait]
pub trait DnsTransport: Send + Sync {
    /// One request/response exchange. `timeout` bounds each I/O step.
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError>;

    fn protocol_name(&self) -> &'static str;

    /// Drops every idle connection.
    fn close_idle(&self);
}

/// The peer went away under a connection we had kept around.
pub(crate) fn is_peer_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

pub(crate) fn map_io_error(server: SocketAddr, e: io::Error) -> DomainError {
    let server = server.to_string();
    match e.kind() {
        io::ErrorKind::ConnectionRefused => DomainError::TransportConnectionRefused { server },
        io::ErrorKind::ConnectionReset => DomainError::TransportConnectionReset { server },
        io::ErrorKind::TimedOut => DomainError::TransportTimeout { server },
        _ => DomainError::Transport {
            server,
            reason: e.to_string(),
        },
    }
}

pub(crate) fn timeout_error(server: SocketAddr) -> DomainError {
    DomainError::TransportTimeout {
        server: server.to_string(),
    }
}

/// Runs `fut` under `timeout`, mapping both the elapsed timer and I/O errors.
pub(crate) async fn with_timeout<T, F>(
    server: SocketAddr,
    timeout: Duration,
    fut: F,
) -> Result<T, DomainError>
where
    F: std::future::Future<Output = io::Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| timeout_error(server))?
        .map_err(|e| map_io_error(server, e))
}
