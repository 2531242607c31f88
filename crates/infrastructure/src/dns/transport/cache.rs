use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Maximum idle connections kept per upstream address.
const MAX_IDLE_PER_HOST: usize = 2;

struct IdleConnection<S> {
    stream: S,
    since: Instant,
}

/// Idle connections of one transport, keyed by upstream address.
///
/// A connection idle for longer than `expire` is dropped on checkout instead
/// of being handed out.
pub struct ConnectionCache<S> {
    idle: DashMap<SocketAddr, Vec<IdleConnection<S>>>,
    expire: Duration,
}

impl<S> ConnectionCache<S> {
    pub fn new(expire: Duration) -> Self {
        Self {
            idle: DashMap::new(),
            expire,
        }
    }

    pub fn expire(&self) -> Duration {
        self.expire
    }

    /// Most recently returned live connection for `addr`, if any.
    pub fn checkout(&self, addr: SocketAddr) -> Option<S> {
        let mut entry = self.idle.get_mut(&addr)?;
        let now = Instant::now();
        while let Some(conn) = entry.pop() {
            if now.duration_since(conn.since) < self.expire {
                return Some(conn.stream);
            }
            debug!(server = %addr, "Dropping expired cached connection");
        }
        None
    }

    pub fn checkin(&self, addr: SocketAddr, stream: S) {
        if self.expire.is_zero() {
            return;
        }
        let mut entry = self.idle.entry(addr).or_default();
        if entry.len() < MAX_IDLE_PER_HOST {
            entry.push(IdleConnection {
                stream,
                since: Instant::now(),
            });
        }
    }

    pub fn idle_count(&self, addr: SocketAddr) -> usize {
        self.idle.get(&addr).map_or(0, |entry| entry.len())
    }

    pub fn clear(&self) {
        self.idle.clear();
    }
}
