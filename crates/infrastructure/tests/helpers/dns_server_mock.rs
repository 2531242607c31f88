#![allow(dead_code)]
use fanout_dns_infrastructure::dns::forwarding::MessageBuilder;
use fanout_dns_infrastructure::dns::transport::tcp::{
    read_with_length_prefix, send_with_length_prefix,
};
use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy)]
pub struct MockBehavior {
    pub answer: Ipv4Addr,
    /// UDP replies carry TC and no answers; TCP replies are complete.
    pub truncate_udp: bool,
    /// The TCP side hangs up after every reply.
    pub close_tcp_after_reply: bool,
    /// Never reply at all.
    pub silent: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            answer: Ipv4Addr::new(93, 184, 216, 34),
            truncate_udp: false,
            close_tcp_after_reply: false,
            silent: false,
        }
    }
}

#[derive(Default)]
pub struct MockCounters {
    pub udp_queries: AtomicUsize,
    pub tcp_connections: AtomicUsize,
    pub tcp_queries: AtomicUsize,
}

/// UDP and TCP DNS server on one loopback port, answering every question
/// with a single A record.
pub struct MockDnsServer {
    addr: SocketAddr,
    counters: Arc<MockCounters>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockDnsServer {
    pub async fn start(behavior: MockBehavior) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let socket = UdpSocket::bind(addr).await?;
        let counters = Arc::new(MockCounters::default());

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task_counters = counters.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        if let Ok((len, peer)) = result {
                            task_counters.udp_queries.fetch_add(1, Ordering::SeqCst);
                            if behavior.silent {
                                continue;
                            }
                            if let Some(reply) = build_reply(&buf[..len], &behavior, behavior.truncate_udp) {
                                let _ = socket.send_to(&reply, peer).await;
                            }
                        }
                    }
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            task_counters.tcp_connections.fetch_add(1, Ordering::SeqCst);
                            tokio::spawn(serve_tcp(stream, behavior, task_counters.clone()));
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            counters,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn udp_queries(&self) -> usize {
        self.counters.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_connections(&self) -> usize {
        self.counters.tcp_connections.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.counters.tcp_queries.load(Ordering::SeqCst)
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockDnsServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_tcp(
    mut stream: tokio::net::TcpStream,
    behavior: MockBehavior,
    counters: Arc<MockCounters>,
) {
    while let Ok(query) = read_with_length_prefix(&mut stream).await {
        counters.tcp_queries.fetch_add(1, Ordering::SeqCst);
        if behavior.silent {
            continue;
        }
        let Some(reply) = build_reply(&query, &behavior, false) else {
            break;
        };
        if send_with_length_prefix(&mut stream, &reply).await.is_err() {
            break;
        }
        if behavior.close_tcp_after_reply {
            break;
        }
    }
}

fn build_reply(query: &[u8], behavior: &MockBehavior, truncate: bool) -> Option<Vec<u8>> {
    let query = Message::from_vec(query).ok()?;
    let mut reply = Message::new(query.id(), MessageType::Response, OpCode::Query);
    reply.set_recursion_desired(query.recursion_desired());
    reply.set_recursion_available(true);
    for question in query.queries() {
        reply.add_query(question.clone());
        if !truncate {
            reply.add_answer(Record::from_rdata(
                question.name().clone(),
                60,
                RData::A(A(behavior.answer)),
            ));
        }
    }
    reply.set_truncated(truncate);
    MessageBuilder::serialize(&reply).ok()
}
