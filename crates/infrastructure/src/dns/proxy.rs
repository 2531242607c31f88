use super::forwarding::{MessageBuilder, ResponseParser};
use super::load_balancer::UpstreamHealth;
use super::transport::tcp::TcpTransport;
#[cfg(feature = "dns-over-rustls")]
use super::transport::tls::TlsTransport;
use super::transport::udp::UdpTransport;
use super::transport::{DnsTransport, DEFAULT_READ_TIMEOUT};
use async_trait::async_trait;
use fanout_dns_application::ports::Upstream;
use fanout_dns_application::{ForwardRequest, RequestContext};
use fanout_dns_domain::{DnsProtocol, DomainError, ForwardOptions, RequestProtocol};
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

enum Endpoint {
    Plain {
        udp: UdpTransport,
        tcp: TcpTransport,
    },
    #[cfg(feature = "dns-over-rustls")]
    Tls(TlsTransport),
}

impl Endpoint {
    fn new(protocol: &DnsProtocol, expire: Duration) -> Result<Self, DomainError> {
        match protocol {
            DnsProtocol::Dns { addr } => Ok(Self::Plain {
                udp: UdpTransport::new(*addr, expire),
                tcp: TcpTransport::new(*addr, expire),
            }),
            #[cfg(feature = "dns-over-rustls")]
            DnsProtocol::Tls { addr, hostname } => {
                Ok(Self::Tls(TlsTransport::new(*addr, hostname.clone(), expire)))
            }
            #[cfg(not(feature = "dns-over-rustls"))]
            DnsProtocol::Tls { .. } => Err(DomainError::ConfigError(format!(
                "TLS upstream {} needs the 'dns-over-rustls' feature",
                protocol
            ))),
        }
    }

    /// TLS endpoints always speak TLS; plain ones follow the per-attempt protocol.
    fn transport(&self, protocol: RequestProtocol) -> &dyn DnsTransport {
        match self {
            Self::Plain { udp, tcp } => match protocol {
                RequestProtocol::Udp => udp as &dyn DnsTransport,
                RequestProtocol::Tcp => tcp as &dyn DnsTransport,
            },
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(tls) => tls,
        }
    }

    fn close_idle(&self) {
        match self {
            Self::Plain { udp, tcp } => {
                udp.close_idle();
                tcp.close_idle();
            }
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(tls) => tls.close_idle(),
        }
    }
}

struct ProxyInner {
    address: String,
    endpoint: Endpoint,
    health: UpstreamHealth,
    probe_over_tcp: bool,
    read_timeout: Duration,
    shutdown: CancellationToken,
}

impl ProxyInner {
    async fn exchange(
        &self,
        message: &Message,
        protocol: RequestProtocol,
        timeout: Duration,
    ) -> Result<Message, DomainError> {
        let bytes = MessageBuilder::serialize(message)?;
        let transport = self.endpoint.transport(protocol);
        let response = transport.send(&bytes, timeout).await?;
        debug!(
            upstream = %self.address,
            protocol = response.protocol_used,
            reused = response.reused,
            "Upstream exchange complete"
        );
        ResponseParser::parse(&response.bytes)
    }

    async fn probe(&self) -> Result<(), DomainError> {
        let probe = MessageBuilder::build_probe();
        let protocol = if self.probe_over_tcp {
            RequestProtocol::Tcp
        } else {
            RequestProtocol::Udp
        };
        let reply = self.exchange(&probe, protocol, self.read_timeout).await?;
        if reply.id() != probe.id() {
            return Err(DomainError::InvalidDnsResponse(format!(
                "Probe reply id {} does not match {}",
                reply.id(),
                probe.id()
            )));
        }
        Ok(())
    }

    /// Probes now, then every interval, until a probe succeeds or shutdown.
    async fn probe_until_healthy(self: Arc<Self>) {
        loop {
            match self.probe().await {
                Ok(()) => {
                    self.health.mark_healthy(&self.address);
                    break;
                }
                Err(e) => {
                    let fails = self.health.mark_failed(&self.address);
                    debug!(upstream = %self.address, fails, error = %e, "Health probe failed");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.health.probe_interval()) => {}
            }
        }
        self.health.end_probe();
    }
}

/// One configured resolver: plain DNS (UDP and TCP) or DNS-over-TLS.
pub struct ProxyUpstream {
    inner: Arc<ProxyInner>,
}

impl ProxyUpstream {
    /// `expire` bounds how long an idle connection stays reusable.
    pub fn new(protocol: &DnsProtocol, expire: Duration) -> Result<Self, DomainError> {
        let endpoint = Endpoint::new(protocol, expire)?;
        Ok(Self {
            inner: Arc::new(ProxyInner {
                address: protocol.to_string(),
                endpoint,
                health: UpstreamHealth::new(DEFAULT_PROBE_INTERVAL),
                probe_over_tcp: false,
                read_timeout: DEFAULT_READ_TIMEOUT,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn from_options(
        protocol: &DnsProtocol,
        expire: Duration,
        options: ForwardOptions,
    ) -> Result<Self, DomainError> {
        Self::new(protocol, expire).map(|proxy| proxy.with_probe_over_tcp(options.force_tcp))
    }

    pub fn with_probe_over_tcp(mut self, over_tcp: bool) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.probe_over_tcp = over_tcp;
        }
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.read_timeout = timeout;
        }
        self
    }

    pub fn fails(&self) -> u32 {
        self.inner.health.fails()
    }

    pub fn is_probing(&self) -> bool {
        self.inner.health.is_probing()
    }
}

#[async_trait]
impl Upstream for ProxyUpstream {
    fn address(&self) -> &str {
        &self.inner.address
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
        options: ForwardOptions,
    ) -> Result<Message, DomainError> {
        let protocol = options.select_protocol(request.protocol());
        let timeout = ctx.timeout_or(self.inner.read_timeout);
        self.inner
            .exchange(request.message(), protocol, timeout)
            .await
    }

    fn is_down(&self, max_fails: u32) -> bool {
        self.inner.health.is_down(max_fails)
    }

    fn record_failure(&self) {
        self.inner.health.mark_failed(&self.inner.address);
    }

    fn probe_health(&self) {
        if self.inner.shutdown.is_cancelled() || !self.inner.health.try_begin_probe() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(inner.probe_until_healthy());
            }
            Err(e) => {
                warn!(upstream = %self.inner.address, error = %e, "No runtime for health probe");
                self.inner.health.end_probe();
            }
        }
    }

    fn start(&self, interval: Duration) {
        self.inner.health.set_probe_interval(interval);
    }

    fn stop(&self) {
        self.inner.shutdown.cancel();
        self.inner.endpoint.close_idle();
    }
}
