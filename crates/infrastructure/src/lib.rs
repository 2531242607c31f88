//! Fanout DNS Infrastructure Layer
//!
//! Network side of the forwarder: UDP/TCP/TLS transports with per-upstream
//! connection caching, the `ProxyUpstream` adapter with health probing,
//! selection policies and the wire-level request handler used by the server.
pub mod dns;
