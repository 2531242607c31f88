use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("Query timeout")]
    QueryTimeout,

    #[error("Query cancelled by caller")]
    QueryCancelled,

    #[error("Transport timeout talking to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Transport error with {server}: {reason}")]
    Transport { server: String, reason: String },

    /// The pooled connection was closed by the remote peer; safe to retry.
    #[error("Cached connection was closed by peer")]
    CachedConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Upstream worker failed: {0}")]
    WorkerFailed(String),

    #[error("No healthy upstream servers available")]
    NoHealthyUpstream,

    #[error("No forwarder defined")]
    NoForwarderConfigured,

    #[error("No next handler found after {0}")]
    NoNextHandler(String),
}
