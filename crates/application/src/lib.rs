//! Fanout DNS Application Layer
//!
//! Ports the forwarder depends on (`Upstream`, `SelectionPolicy`,
//! `DnsHandler`) and the fan-out forwarding use case built on top of them.
pub mod context;
pub mod ports;
pub mod request;
pub mod use_cases;

pub use context::RequestContext;
pub use request::ForwardRequest;
