use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_DNS_PORT: u16 = 53;
pub const DEFAULT_TLS_PORT: u16 = 853;

/// One upstream endpoint as written in the `to` list.
///
/// Plain DNS endpoints pick UDP or TCP per attempt; TLS endpoints always
/// speak DNS-over-TLS (RFC 7858).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    Dns { addr: SocketAddr },
    Tls { addr: SocketAddr, hostname: Arc<str> },
}

impl DnsProtocol {
    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            DnsProtocol::Dns { addr } | DnsProtocol::Tls { addr, .. } => *addr,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            DnsProtocol::Tls { hostname, .. } => Some(hostname),
            DnsProtocol::Dns { .. } => None,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, DnsProtocol::Tls { .. })
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            DnsProtocol::Dns { .. } => "DNS",
            DnsProtocol::Tls { .. } => "TLS",
        }
    }

    /// Replaces the TLS server name used for certificate verification.
    /// No-op for plain DNS endpoints.
    pub fn with_server_name(self, server_name: &str) -> Self {
        match self {
            DnsProtocol::Tls { addr, .. } => DnsProtocol::Tls {
                addr,
                hostname: server_name.into(),
            },
            other => other,
        }
    }
}

fn parse_host_port(s: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Some((host, None));
        }
        let port = tail.strip_prefix(':')?.parse::<u16>().ok()?;
        return Some((host, Some(port)));
    }
    // A bare IPv6 address has more than one colon and no port.
    if s.matches(':').count() > 1 {
        return Some((s, None));
    }
    match s.rsplit_once(':') {
        Some((host, port_str)) => Some((host, Some(port_str.parse::<u16>().ok()?))),
        None => Some((s, None)),
    }
}

fn parse_socket_addr(s: &str, default_port: u16) -> Result<SocketAddr, String> {
    let (host, port) = parse_host_port(s).ok_or_else(|| format!("Invalid address '{}'", s))?;
    let ip = host
        .parse::<IpAddr>()
        .map_err(|_| format!("Upstream '{}' is not an IP address", s))?;
    Ok(SocketAddr::new(ip, port.unwrap_or(default_port)))
}

impl FromStr for DnsProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty upstream address".to_string());
        }
        if let Some(rest) = s.strip_prefix("tls://") {
            let (host_port, server_name) = match rest.split_once('#') {
                Some((_, "")) => {
                    return Err(format!("Empty TLS server name in '{}'", s));
                }
                Some((host_port, name)) => (host_port, Some(name)),
                None => (rest, None),
            };
            let addr = parse_socket_addr(host_port, DEFAULT_TLS_PORT)
                .map_err(|e| format!("Invalid TLS upstream: {}", e))?;
            let hostname = match server_name {
                Some(name) => name.into(),
                None => addr.ip().to_string().into(),
            };
            return Ok(DnsProtocol::Tls { addr, hostname });
        }
        let rest = s.strip_prefix("dns://").unwrap_or(s);
        if rest.contains("://") {
            return Err(format!(
                "Unsupported upstream scheme in '{}'. Expected 'dns://' or 'tls://'",
                s
            ));
        }
        let addr = parse_socket_addr(rest, DEFAULT_DNS_PORT)?;
        Ok(DnsProtocol::Dns { addr })
    }
}

impl fmt::Display for DnsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsProtocol::Dns { addr } => write!(f, "dns://{}", addr),
            DnsProtocol::Tls { addr, hostname } => write!(f, "tls://{}#{}", addr, hostname),
        }
    }
}
