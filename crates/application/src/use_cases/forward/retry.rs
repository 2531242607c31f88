use super::outcome::Outcome;
use crate::context::RequestContext;
use crate::ports::Upstream;
use crate::request::ForwardRequest;
use fanout_dns_domain::{DomainError, ForwardOptions};
use std::sync::Arc;
use tracing::{debug, warn};

/// Consecutive "cached connection closed" signals tolerated per attempt
/// before the signal is charged as an ordinary failure.
pub const MAX_UNCOUNTED_RETRIES: u32 = 3;

/// Per-upstream worker: retries one upstream until it answers, answers
/// something unrelated, or exhausts its failure budget.
pub struct RetryLoop {
    upstream: Arc<dyn Upstream>,
    request: Arc<ForwardRequest>,
    ctx: RequestContext,
    options: ForwardOptions,
    max_fails: u32,
}

impl RetryLoop {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        request: Arc<ForwardRequest>,
        ctx: RequestContext,
        options: ForwardOptions,
        max_fails: u32,
    ) -> Self {
        Self {
            upstream,
            request,
            ctx,
            options,
            max_fails,
        }
    }

    /// `max_fails == 0` disables health accounting but still allows one attempt.
    fn budget(&self) -> u32 {
        self.max_fails.max(1)
    }

    pub async fn run(self) -> Outcome {
        let budget = self.budget();
        let mut options = self.options;
        let mut fails = 0u32;
        let mut uncounted = 0u32;

        loop {
            let result = self
                .ctx
                .run(self.upstream.send(&self.ctx, &self.request, options))
                .await;

            let err = match result {
                Err(DomainError::CachedConnectionClosed) if uncounted < MAX_UNCOUNTED_RETRIES => {
                    uncounted += 1;
                    debug!(upstream = %self.upstream.address(), retry = uncounted, "Cached connection closed, retrying");
                    continue;
                }
                Ok(reply) if reply.truncated() && !options.force_tcp && options.prefer_udp => {
                    debug!(upstream = %self.upstream.address(), "Truncated reply, retrying over TCP");
                    options.force_tcp = true;
                    continue;
                }
                Ok(reply) => return self.settle(reply),
                Err(e) => e,
            };

            if self.ctx.is_cancelled() {
                debug!(upstream = %self.upstream.address(), "Query cancelled, abandoning upstream");
                return Outcome::Failed(err);
            }

            fails += 1;
            uncounted = 0;
            self.upstream.record_failure();
            if self.max_fails != 0 {
                self.upstream.probe_health();
            }

            if fails >= budget || self.ctx.is_expired() {
                warn!(
                    upstream = %self.upstream.address(),
                    attempts = fails,
                    error = %err,
                    "Upstream failed"
                );
                return Outcome::Failed(err);
            }
            debug!(upstream = %self.upstream.address(), attempt = fails, error = %err, "Retrying upstream");
        }
    }

    fn settle(&self, reply: hickory_proto::op::Message) -> Outcome {
        if self.request.matches_reply(&reply) {
            return Outcome::Success(reply);
        }
        warn!(
            upstream = %self.upstream.address(),
            id = reply.id(),
            expected_id = self.request.id(),
            qname = ?self.request.qname(),
            qtype = ?self.request.qtype(),
            "Wrong reply for query"
        );
        Outcome::Malformed(self.request.format_error_reply())
    }
}
