#![allow(dead_code)]

use async_trait::async_trait;
use fanout_dns_application::ports::{DnsHandler, ResponseSink, SelectionPolicy, Upstream};
use fanout_dns_application::{ForwardRequest, RequestContext};
use fanout_dns_domain::{DomainError, ForwardOptions, RequestProtocol};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── messages ───────────────────────────────────────────────────────────────

pub fn query_message(id: u16, name: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(id, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
    message
}

pub fn request(name: &str, record_type: RecordType) -> ForwardRequest {
    ForwardRequest::new(query_message(4242, name, record_type), RequestProtocol::Udp)
}

pub fn a(ip: &str) -> RData {
    RData::A(A(Ipv4Addr::from_str(ip).unwrap()))
}

pub fn aaaa(ip: &str) -> RData {
    RData::AAAA(AAAA(Ipv6Addr::from_str(ip).unwrap()))
}

pub fn answer_types(message: &Message) -> Vec<RecordType> {
    message.answers().iter().map(|r| r.record_type()).collect()
}

fn reply_to(request: &ForwardRequest, id: u16, records: &[RData]) -> Message {
    let mut reply = Message::new(id, MessageType::Response, OpCode::Query);
    reply.set_recursion_desired(true);
    reply.set_recursion_available(true);
    if let Some(question) = request.question() {
        reply.add_query(question.clone());
        for rdata in records {
            reply.add_answer(Record::from_rdata(
                question.name().clone(),
                300,
                rdata.clone(),
            ));
        }
    }
    reply
}

// ── MockUpstream ───────────────────────────────────────────────────────────

/// What a scripted upstream does for one `send`.
#[derive(Clone)]
pub enum Step {
    Answer(Vec<RData>),
    /// A truncated reply when sent over UDP, the answer when sent over TCP.
    TruncatedUnlessTcp(Vec<RData>),
    WrongId,
    Fail(DomainError),
    CachedClosed,
    /// Never completes; only the request context ends it.
    Hang,
    Panic,
}

pub struct MockUpstream {
    address: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Option<Duration>,
    down: AtomicBool,
    calls: AtomicU32,
    failures: AtomicU32,
    probes: AtomicU32,
    started: AtomicBool,
    stopped: AtomicBool,
    sent_options: Mutex<Vec<ForwardOptions>>,
    spans: Mutex<Vec<&'static str>>,
}

impl MockUpstream {
    pub fn new(address: &str, fallback: Step) -> Self {
        Self {
            address: address.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            down: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            sent_options: Mutex::new(Vec::new()),
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(address: &str, records: Vec<RData>) -> Arc<Self> {
        Arc::new(Self::new(address, Step::Answer(records)))
    }

    pub fn failing(address: &str) -> Arc<Self> {
        let error = DomainError::TransportTimeout {
            server: address.to_string(),
        };
        Arc::new(Self::new(address, Step::Fail(error)))
    }

    /// Steps consumed in order before `fallback` applies.
    pub fn with_script(self, steps: Vec<Step>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn sent_options(&self) -> Vec<ForwardOptions> {
        self.sent_options.lock().unwrap().clone()
    }

    /// Name of the span each `send` ran in, when that span carries an
    /// `upstream` field.
    pub fn spans(&self) -> Vec<&'static str> {
        self.spans.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(
        &self,
        _ctx: &RequestContext,
        request: &ForwardRequest,
        options: ForwardOptions,
    ) -> Result<Message, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent_options.lock().unwrap().push(options);
        if let Some(meta) = tracing::Span::current().metadata() {
            if meta.fields().field("upstream").is_some() {
                self.spans.lock().unwrap().push(meta.name());
            }
        }
        let step = self.next_step();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            Step::Answer(records) => Ok(reply_to(request, request.id(), &records)),
            Step::TruncatedUnlessTcp(records) => {
                if options.force_tcp {
                    Ok(reply_to(request, request.id(), &records))
                } else {
                    let mut reply = reply_to(request, request.id(), &[]);
                    reply.set_truncated(true);
                    Ok(reply)
                }
            }
            Step::WrongId => Ok(reply_to(request, request.id().wrapping_add(1), &[])),
            Step::Fail(e) => Err(e),
            Step::CachedClosed => Err(DomainError::CachedConnectionClosed),
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("scripted upstream panic"),
        }
    }

    fn is_down(&self, _max_fails: u32) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn probe_health(&self) {
        self.probes.fetch_add(1, Ordering::SeqCst);
    }

    fn start(&self, _interval: Duration) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

// ── policy ─────────────────────────────────────────────────────────────────

/// Hands upstreams out in registration order.
pub struct InOrderPolicy;

impl SelectionPolicy for InOrderPolicy {
    fn name(&self) -> &'static str {
        "in_order"
    }

    fn list(&self, upstreams: &[Arc<dyn Upstream>]) -> Vec<Arc<dyn Upstream>> {
        upstreams.to_vec()
    }
}

// ── sink / next handler ────────────────────────────────────────────────────

#[derive(Default)]
pub struct CollectingSink {
    pub written: Vec<Message>,
}

#[async_trait]
impl ResponseSink for CollectingSink {
    async fn write_message(&mut self, message: Message) -> Result<(), DomainError> {
        self.written.push(message);
        Ok(())
    }
}

/// Next handler in the chain that answers REFUSED and counts invocations.
#[derive(Default)]
pub struct RefusingHandler {
    calls: AtomicU32,
}

impl RefusingHandler {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsHandler for RefusingHandler {
    fn name(&self) -> &'static str {
        "refuse"
    }

    async fn process(
        &self,
        _ctx: &RequestContext,
        request: &ForwardRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<ResponseCode, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reply = request.format_error_reply();
        reply.set_response_code(ResponseCode::Refused);
        sink.write_message(reply).await?;
        Ok(ResponseCode::Refused)
    }
}
