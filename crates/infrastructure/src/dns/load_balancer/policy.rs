use fanout_dns_application::ports::{SelectionPolicy, Upstream};
use fanout_dns_domain::PolicyKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Random order per query.
pub struct RandomPolicy;

impl SelectionPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn list(&self, upstreams: &[Arc<dyn Upstream>]) -> Vec<Arc<dyn Upstream>> {
        let mut list = upstreams.to_vec();
        fastrand::shuffle(&mut list);
        list
    }
}

/// Rotates the starting upstream by one on every query.
#[derive(Default)]
pub struct RoundRobinPolicy {
    next: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn list(&self, upstreams: &[Arc<dyn Upstream>]) -> Vec<Arc<dyn Upstream>> {
        if upstreams.is_empty() {
            return Vec::new();
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % upstreams.len();
        let mut list = Vec::with_capacity(upstreams.len());
        list.extend_from_slice(&upstreams[start..]);
        list.extend_from_slice(&upstreams[..start]);
        list
    }
}

/// Configured order.
pub struct SequentialPolicy;

impl SelectionPolicy for SequentialPolicy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn list(&self, upstreams: &[Arc<dyn Upstream>]) -> Vec<Arc<dyn Upstream>> {
        upstreams.to_vec()
    }
}

pub fn policy_from_config(kind: PolicyKind) -> Arc<dyn SelectionPolicy> {
    match kind {
        PolicyKind::Random => Arc::new(RandomPolicy),
        PolicyKind::RoundRobin => Arc::new(RoundRobinPolicy::new()),
        PolicyKind::Sequential => Arc::new(SequentialPolicy),
    }
}
