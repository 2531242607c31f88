use super::{
    is_peer_closed, map_io_error, timeout_error, ConnectionCache, DnsTransport,
    TransportResponse, DEFAULT_DIAL_TIMEOUT,
};
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

pub struct TcpTransport {
    server_addr: SocketAddr,
    cache: ConnectionCache<TcpStream>,
    dial_timeout: Duration,
}

impl TcpTransport {
    pub fn new(server_addr: SocketAddr, expire: Duration) -> Self {
        Self {
            server_addr,
            cache: ConnectionCache::new(expire),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn idle_connections(&self) -> usize {
        self.cache.idle_count(self.server_addr)
    }

    async fn connect_new(&self, timeout: Duration) -> Result<TcpStream, DomainError> {
        let stream = tokio::time::timeout(
            timeout.min(self.dial_timeout),
            TcpStream::connect(self.server_addr),
        )
        .await
        .map_err(|_| timeout_error(self.server_addr))?
        .map_err(|e| map_io_error(self.server_addr, e))?;

        stream
            .set_nodelay(true)
            .map_err(|e| map_io_error(self.server_addr, e))?;
        Ok(stream)
    }
}

#[async_trait]
impl DnsTransport for TcpTransport {
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
            "TCP response received"
        );

        Ok(TransportResponse {
            bytes,
            protocol_used: "TCP",
            reused,
        })
    }

    fn protocol_name(&self) -> &'static str {
        "TCP"
    }

    fn close_idle(&self) {
        self.cache.clear();
    }
}

/// Exchanges one message over a cached stream, or a fresh one from `connect`.
///
/// A cached stream the peer has closed yields `CachedConnectionClosed` and is
/// dropped; the caller retries and gets a fresh connection.
pub(crate) async fn exchange_cached<S, C, Fut>(
    cache: &ConnectionCache<S>,
    server: SocketAddr,
    message_bytes: &[u8],
    timeout: Duration,
    connect: C,
) -> Result<(Vec<u8>, bool), DomainError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: FnOnce() -> Fut,
    Fut: Future<Output = Result<S, DomainError>>,
{
    if let Some(mut stream) = cache.checkout(server) {
        return match exchange(&mut stream, message_bytes, timeout).await {
            Ok(Ok(bytes)) => {
                cache.checkin(server, stream);
                Ok((bytes, true))
            }
            Ok(Err(e)) if is_peer_closed(&e) => {
                debug!(server = %server, error = %e, "Cached connection closed by peer");
                Err(DomainError::CachedConnectionClosed)
            }
            Ok(Err(e)) => Err(map_io_error(server, e)),
            Err(_) => Err(timeout_error(server)),
        };
    }

    let mut stream = connect().await?;
    let bytes = exchange(&mut stream, message_bytes, timeout)
        .await
        .map_err(|_| timeout_error(server))?
        .map_err(|e| map_io_error(server, e))?;
    cache.checkin(server, stream);
    Ok((bytes, false))
}

async fn exchange<S>(
    stream: &mut S,
    message_bytes: &[u8],
    timeout: Duration,
) -> Result<io::Result<Vec<u8>>, tokio::time::error::Elapsed>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async {
        send_with_length_prefix(stream, message_bytes).await?;
        read_with_length_prefix(stream).await
    })
    .await
}

pub async fn send_with_length_prefix<S>(stream: &mut S, message_bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message too large: {} bytes", message_bytes.len()),
        )
    })?;

    let mut framed = Vec::with_capacity(message_bytes.len() + 2);
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(message_bytes);
    stream.write_all(&framed).await?;
    stream.flush().await
}

pub async fn read_with_length_prefix<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;

    let response_len = u16::from_be_bytes(len_buf) as usize;
    if response_len > MAX_TCP_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {} bytes", response_len),
        ));
    }

    let mut response = vec![0u8; response_len];
    stream.read_exact(&mut response).await?;
    Ok(response)
}
