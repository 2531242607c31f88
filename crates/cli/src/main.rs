use clap::Parser;
use fanout_dns_domain::CliOverrides;
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;
mod di;
mod server;

#[derive(Parser)]
#[command(name = "fanout-dns")]
#[command(version)]
#[command(about = "Fanout DNS - forwards every query to all upstreams and merges the answers")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'd', long)]
    dns_port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Upstream server, repeatable; replaces `forward.to` from the file
    #[arg(short = 'u', long = "upstream", value_name = "ADDR")]
    upstreams: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.dns_port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
        upstreams: cli.upstreams.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;

    bootstrap::init_logging(&config.logging);

    info!("Starting Fanout DNS v{}", env!("CARGO_PKG_VERSION"));
    bootstrap::log_config(&config);

    let dns_services = di::DnsServices::new(&config)?;

    let bind_ip: IpAddr = config.server.bind_address.parse()?;
    let dns_addr = SocketAddr::new(bind_ip, config.server.dns_port);
    let shutdown = CancellationToken::new();

    let mut server_task = tokio::spawn(server::start_dns_server(
        dns_addr,
        dns_services.server_handler.clone(),
        shutdown.clone(),
    ));

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            Ok(())
        }
        joined = &mut server_task => match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("DNS server task failed: {}", e)),
        },
    };

    shutdown.cancel();
    dns_services.forward.on_shutdown();

    info!("Server shutdown complete");
    server_result
}
