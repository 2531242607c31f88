use crate::context::RequestContext;
use crate::request::ForwardRequest;
use async_trait::async_trait;
use fanout_dns_domain::{DomainError, ForwardOptions};
use hickory_proto::op::Message;
use std::time::Duration;

/// One configured resolver the forwarder can query.
///
/// Implementations own connection reuse and their failure counter; the
/// forwarder only reads [`Upstream::is_down`] and reports observations.
#[async_trait]
pub trait Upstream: Send + Sync {
    fn address(&self) -> &str;

    /// Sends `request` once. A pooled connection found closed by the peer
    /// is reported as [`DomainError::CachedConnectionClosed`].
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
        options: ForwardOptions,
    ) -> Result<Message, DomainError>;

    fn is_down(&self, max_fails: u32) -> bool;

    fn record_failure(&self);

    /// Fire-and-forget out-of-band health probe.
    fn probe_health(&self);

    /// Called once when the upstream is registered with a forwarder.
    fn start(&self, interval: Duration);

    fn stop(&self) {}
}
