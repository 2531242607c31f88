use fanout_dns_application::ports::DnsHandler;
use fanout_dns_application::use_cases::Forward;
use fanout_dns_domain::Config;
use fanout_dns_infrastructure::dns::{policy_from_config, DnsServerHandler, ProxyUpstream};
use std::sync::Arc;
use tracing::info;

pub struct DnsServices {
    pub forward: Arc<Forward>,
    pub server_handler: Arc<DnsServerHandler>,
}

impl DnsServices {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let forward_config = &config.forward;
        let policy = policy_from_config(forward_config.policy);
        let mut forward = Forward::from_config(forward_config, policy)?;

        for protocol in forward_config.upstreams()? {
            let proxy =
                ProxyUpstream::from_options(&protocol, forward_config.expire(), forward.options())?;
            info!(upstream = %protocol, "Registered upstream");
            forward.set_proxy(Arc::new(proxy));
        }
        forward.check_ready()?;

        info!(
            zone = %forward.admission().zone(),
            upstreams = forward.len(),
            max_fails = forward.max_fails(),
            force_tcp = forward.force_tcp(),
            prefer_udp = forward.prefer_udp(),
            "Forwarder ready"
        );

        let forward = Arc::new(forward);
        let server_handler = Arc::new(DnsServerHandler::new(
            forward.clone() as Arc<dyn DnsHandler>,
            forward_config.query_timeout(),
        ));

        Ok(Self {
            forward,
            server_handler,
        })
    }
}
