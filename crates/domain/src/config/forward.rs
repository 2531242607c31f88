use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::ConfigError;
use crate::dns_protocol::DnsProtocol;
use crate::forward_options::ForwardOptions;

/// Upper bound on the number of upstreams one forwarder may fan out to.
pub const MAX_UPSTREAMS: usize = 15;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Random,

    RoundRobin,

    Sequential,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::Sequential => "sequential",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardConfig {
    /// Zone of responsibility; only names at or below it are forwarded.
    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default)]
    pub to: Vec<String>,

    /// Sub-zones of `from` that are never forwarded.
    #[serde(default)]
    pub except: Vec<String>,

    #[serde(default = "default_max_fails")]
    pub max_fails: u32,

    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,

    #[serde(default)]
    pub force_tcp: bool,

    #[serde(default)]
    pub prefer_udp: bool,

    #[serde(default)]
    pub tls_servername: Option<String>,

    #[serde(default)]
    pub policy: PolicyKind,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            to: Vec::new(),
            except: Vec::new(),
            max_fails: default_max_fails(),
            health_check_interval_ms: default_health_check_interval_ms(),
            expire_secs: default_expire_secs(),
            force_tcp: false,
            prefer_udp: false,
            tls_servername: None,
            policy: PolicyKind::default(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl ForwardConfig {
    pub fn options(&self) -> ForwardOptions {
        ForwardOptions::new(self.force_tcp, self.prefer_udp)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Parses every `to` entry, applying `tls_servername` to TLS endpoints.
    pub fn upstreams(&self) -> Result<Vec<DnsProtocol>, ConfigError> {
        self.to
            .iter()
            .map(|s| {
                let protocol = s.parse::<DnsProtocol>().map_err(|e| {
                    ConfigError::Validation(format!("Invalid upstream '{}': {}", s, e))
                })?;
                Ok(match &self.tls_servername {
                    Some(name) => protocol.with_server_name(name),
                    None => protocol,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.to.is_empty() {
            return Err(ConfigError::Validation(
                "No upstream servers configured".to_string(),
            ));
        }
        if self.to.len() > MAX_UPSTREAMS {
            return Err(ConfigError::Validation(format!(
                "More than {} upstream servers configured ({})",
                MAX_UPSTREAMS,
                self.to.len()
            )));
        }
        if self.force_tcp && self.prefer_udp {
            return Err(ConfigError::Validation(
                "force_tcp and prefer_udp are mutually exclusive".to_string(),
            ));
        }
        if self.health_check_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "health_check_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "query_timeout_ms must be greater than 0".to_string(),
            ));
        }
        validate_zone(&self.from)?;
        for zone in &self.except {
            validate_zone(zone)?;
        }
        self.upstreams()?;
        Ok(())
    }
}

fn validate_zone(zone: &str) -> Result<(), ConfigError> {
    if zone.is_empty() {
        return Err(ConfigError::Validation("Empty zone name".to_string()));
    }
    if zone == "." {
        return Ok(());
    }
    let trimmed = zone.trim_end_matches('.');
    if trimmed.len() > 253 {
        return Err(ConfigError::Validation(format!("Zone '{}' is too long", zone)));
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ConfigError::Validation(format!(
                "Zone '{}' has an invalid label",
                zone
            )));
        }
    }
    Ok(())
}

fn default_from() -> String {
    ".".to_string()
}

fn default_max_fails() -> u32 {
    2
}

fn default_health_check_interval_ms() -> u64 {
    500
}

fn default_expire_secs() -> u64 {
    10
}

fn default_query_timeout_ms() -> u64 {
    5000
}
