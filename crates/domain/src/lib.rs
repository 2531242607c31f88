//! Fanout DNS Domain Layer
pub mod config;
pub mod dns_protocol;
pub mod errors;
pub mod forward_options;

pub use config::{
    CliOverrides, Config, ConfigError, ForwardConfig, LogFormat, LoggingConfig, PolicyKind,
    ServerConfig,
};
pub use dns_protocol::DnsProtocol;
pub use errors::DomainError;
pub use forward_options::{ForwardOptions, RequestProtocol};
