use fanout_dns_domain::{CliOverrides, Config};
use tracing::info;

/// Loads the configuration file, applies CLI overrides and validates the result.
pub fn load_config(path: Option<&str>, overrides: CliOverrides) -> anyhow::Result<Config> {
    let config = Config::load(path, overrides)?;
    config.validate()?;
    Ok(config)
}

pub fn log_config(config: &Config) {
    info!(
        bind_address = %config.server.bind_address,
        dns_port = config.server.dns_port,
        from = %config.forward.from,
        upstreams = config.forward.to.len(),
        max_fails = config.forward.max_fails,
        policy = config.forward.policy.as_str(),
        "Configuration loaded"
    );
}
