pub mod forwarding;
pub mod load_balancer;
pub mod proxy;
pub mod server;
pub mod transport;

pub use load_balancer::{policy_from_config, RandomPolicy, RoundRobinPolicy, SequentialPolicy};
pub use proxy::ProxyUpstream;
pub use server::DnsServerHandler;
