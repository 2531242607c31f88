use super::Upstream;
use std::sync::Arc;

/// Orders (and may filter) the configured upstreams for one query.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn list(&self, upstreams: &[Arc<dyn Upstream>]) -> Vec<Arc<dyn Upstream>>;
}
