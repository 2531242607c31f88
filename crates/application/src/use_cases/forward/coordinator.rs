use super::admission::Admission;
use super::aggregate::synthesize;
use super::outcome::Outcome;
use super::retry::RetryLoop;
use crate::context::RequestContext;
use crate::ports::{DnsHandler, ResponseSink, SelectionPolicy, Upstream};
use crate::request::ForwardRequest;
use async_trait::async_trait;
use fanout_dns_domain::{DomainError, ForwardConfig, ForwardOptions};
use hickory_proto::op::{Message, ResponseCode};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, debug_span, warn, Instrument};

const DEFAULT_MAX_FAILS: u32 = 2;
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Fan-out forwarder: sends each admitted query to every live upstream and
/// merges the address records of all answers into one reply.
pub struct Forward {
    proxies: Vec<Arc<dyn Upstream>>,
    policy: Arc<dyn SelectionPolicy>,
    admission: Admission,
    max_fails: u32,
    options: ForwardOptions,
    health_check_interval: Duration,
    next: Option<Arc<dyn DnsHandler>>,
}

impl Forward {
    pub fn new(policy: Arc<dyn SelectionPolicy>) -> Self {
        Self {
            proxies: Vec::new(),
            policy,
            admission: Admission::default(),
            max_fails: DEFAULT_MAX_FAILS,
            options: ForwardOptions::default(),
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            next: None,
        }
    }

    /// Builds a forwarder without upstreams from the `[forward]` section.
    pub fn from_config(
        config: &ForwardConfig,
        policy: Arc<dyn SelectionPolicy>,
    ) -> Result<Self, DomainError> {
        let admission = Admission::from_config(&config.from, &config.except)?;
        Ok(Self::new(policy)
            .with_admission(admission)
            .with_max_fails(config.max_fails)
            .with_options(config.options())
            .with_health_check_interval(config.health_check_interval()))
    }

    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails;
        self
    }

    pub fn with_options(mut self, options: ForwardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_next(mut self, next: Arc<dyn DnsHandler>) -> Self {
        self.next = Some(next);
        self
    }

    /// Registers an upstream and starts its health probing.
    pub fn set_proxy(&mut self, proxy: Arc<dyn Upstream>) {
        proxy.start(self.health_check_interval);
        self.proxies.push(proxy);
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Upstreams in the order the selection policy hands them out.
    pub fn list(&self) -> Vec<Arc<dyn Upstream>> {
        self.policy.list(&self.proxies)
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn max_fails(&self) -> u32 {
        self.max_fails
    }

    pub fn options(&self) -> ForwardOptions {
        self.options
    }

    pub fn force_tcp(&self) -> bool {
        self.options.force_tcp
    }

    pub fn prefer_udp(&self) -> bool {
        self.options.prefer_udp
    }

    /// Fails with `NoForwarderConfigured` until at least one upstream is
    /// registered.
    pub fn check_ready(&self) -> Result<(), DomainError> {
        if self.proxies.is_empty() {
            return Err(DomainError::NoForwarderConfigured);
        }
        Ok(())
    }

    pub fn admit(&self, request: &ForwardRequest) -> bool {
        self.admission.admit(request)
    }

    pub fn on_shutdown(&self) {
        for proxy in &self.proxies {
            proxy.stop();
        }
    }

    /// Queries every live upstream concurrently and waits for all of them.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
    ) -> Result<Message, DomainError> {
        let live: SmallVec<[Arc<dyn Upstream>; 8]> = self
            .list()
            .into_iter()
            .filter(|proxy| !proxy.is_down(self.max_fails))
            .collect();

        if live.is_empty() {
            warn!(
                upstreams = self.proxies.len(),
                qname = ?request.qname(),
                "All upstreams are down"
            );
            return Err(DomainError::NoHealthyUpstream);
        }

        debug!(
            live = live.len(),
            policy = self.policy.name(),
            qname = ?request.qname(),
            "Fanning out query"
        );

        let request = Arc::new(request.clone());
        let mut workers = JoinSet::new();
        for proxy in live {
            let span = debug_span!(
                "connect",
                upstream = %proxy.address(),
                qname = ?request.qname()
            );
            let worker = RetryLoop::new(
                proxy,
                Arc::clone(&request),
                ctx.clone(),
                self.options,
                self.max_fails,
            );
            workers.spawn(worker.run().instrument(span));
        }

        let mut outcomes = Vec::with_capacity(workers.len());
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                warn!(error = %e, "Upstream worker panicked");
                Outcome::Failed(DomainError::WorkerFailed(e.to_string()))
            });
            debug!(outcome = outcome.kind(), "Upstream worker finished");
            outcomes.push(outcome);
        }

        synthesize(outcomes)
    }

    async fn next_or_failure(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<ResponseCode, DomainError> {
        match &self.next {
            Some(next) => next.process(ctx, request, sink).await,
            None => Err(DomainError::NoNextHandler(self.name().to_string())),
        }
    }
}

#[async_trait]
impl DnsHandler for Forward {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<ResponseCode, DomainError> {
        if !self.admit(request) {
            debug!(qname = ?request.qname(), "Query outside forwarded zone, delegating");
            return self.next_or_failure(ctx, request, sink).await;
        }

        let reply = self.forward(ctx, request).await?;
        if let Err(e) = sink.write_message(reply).await {
            warn!(error = %e, client = ?request.client(), "Failed to write reply");
        }
        Ok(ResponseCode::NoError)
    }
}
