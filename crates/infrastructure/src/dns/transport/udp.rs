//! UDP Transport for DNS queries (RFC 1035 §4.2.1)
//!
//! Messages are sent as-is (no framing). Sockets are connected to the
//! upstream so datagrams from other sources never reach us; replies whose id
//! differs from the query's are skipped until the right one or the timeout.

use super::{map_io_error, timeout_error, ConnectionCache, DnsTransport, TransportResponse};
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub struct UdpTransport {
    server_addr: SocketAddr,
    cache: ConnectionCache<UdpSocket>,
}

impl UdpTransport {
    pub fn new(server_addr: SocketAddr, expire: Duration) -> Self {
        Self {
            server_addr,
            cache: ConnectionCache::new(expire),
        }
    }

    async fn connect_new(&self) -> Result<UdpSocket, DomainError> {
        let bind_addr: SocketAddr = if self.server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| map_io_error(self.server_addr, e))?;
        socket
            .connect(self.server_addr)
            .await
            .map_err(|e| map_io_error(self.server_addr, e))?;
        Ok(socket)
    }

    async fn exchange(
        &self,
        socket: &UdpSocket,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let deadline = Instant::now() + timeout;
        tokio::time::timeout_at(deadline, socket.send(message_bytes))
            .await
            .map_err(|_| timeout_error(self.server_addr))?
            .map_err(|e| map_io_error(self.server_addr, e))?;

        let query_id = wire_id(message_bytes);
        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv(&mut recv_buf))
                .await
                .map_err(|_| timeout_error(self.server_addr))?
                .map_err(|e| map_io_error(self.server_addr, e))?;

            if received >= 2 && wire_id(&recv_buf[..received]) == query_id {
                recv_buf.truncate(received);
                return Ok(recv_buf);
            }
            debug!(
                server = %self.server_addr,
                expected_id = ?query_id,
                bytes = received,
                "Skipping UDP datagram with unexpected id"
            );
        }
    }
}

/// Transaction id of a raw DNS message.
pub(crate) fn wire_id(bytes: &[u8]) -> Option<u16> {
    (bytes.len() >= 2).then(|| u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let (socket, reused) = match self.cache.checkout(self.server_addr) {
            Some(socket) => (socket, true),
            None => (self.connect_new().await?, false),
        };

        let bytes = self.exchange(&socket, message_bytes, timeout).await?;
        self.cache.checkin(self.server_addr, socket);

        debug!(
            server = %self.server_addr,
            bytes_received = bytes.len(),
            reused,
            "UDP response received"
        );

        Ok(TransportResponse {
            bytes,
            protocol_used: "UDP",
            reused,
        })
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }

    fn close_idle(&self) {
        self.cache.clear();
    }
}
