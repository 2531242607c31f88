use serde::{Deserialize, Serialize};

/// Transport mode for a single attempt against one upstream.
///
/// `Copy` on purpose: every worker owns its own value so a UDP→TCP
/// escalation stays local to that worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardOptions {
    pub force_tcp: bool,
    pub prefer_udp: bool,
}

impl ForwardOptions {
    pub fn new(force_tcp: bool, prefer_udp: bool) -> Self {
        Self {
            force_tcp,
            prefer_udp,
        }
    }

    /// Picks the wire protocol for an attempt given the protocol the client
    /// used to reach us.
    pub fn select_protocol(&self, incoming: RequestProtocol) -> RequestProtocol {
        if self.force_tcp {
            RequestProtocol::Tcp
        } else if self.prefer_udp {
            RequestProtocol::Udp
        } else {
            incoming
        }
    }
}

/// Protocol a query arrived over, or is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestProtocol {
    Udp,
    Tcp,
}

impl RequestProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl std::fmt::Display for RequestProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
