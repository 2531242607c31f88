use super::forwarding::MessageBuilder;
use super::transport::udp::wire_id;
use async_trait::async_trait;
use fanout_dns_application::ports::{DnsHandler, ResponseSink};
use fanout_dns_application::{ForwardRequest, RequestContext};
use fanout_dns_domain::{DomainError, RequestProtocol};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Classic DNS UDP payload limit (RFC 1035 §4.2.1).
const DEFAULT_UDP_PAYLOAD: u16 = 512;

/// Holds the single reply a handler writes.
#[derive(Default)]
struct ReplySlot {
    reply: Option<Message>,
}

#[async_trait]
impl ResponseSink for ReplySlot {
    async fn write_message(&mut self, message: Message) -> Result<(), DomainError> {
        self.reply = Some(message);
        Ok(())
    }
}

/// Turns raw inbound queries into replies through the handler chain.
///
/// Handler errors become SERVFAIL; undecodable queries become FORMERR when
/// at least their id can be read, and are dropped otherwise.
pub struct DnsServerHandler {
    handler: Arc<dyn DnsHandler>,
    query_timeout: Duration,
}

impl DnsServerHandler {
    pub fn new(handler: Arc<dyn DnsHandler>, query_timeout: Duration) -> Self {
        Self {
            handler,
            query_timeout,
        }
    }

    pub async fn handle_udp(&self, query: &[u8], client: SocketAddr) -> Option<Vec<u8>> {
        let (reply, max_payload) = self.handle(query, client, RequestProtocol::Udp).await?;
        let bytes = encode(&reply)?;
        let limit = max_payload as usize;
        if bytes.len() <= limit {
            return Some(bytes);
        }
        debug!(client = %client, size = bytes.len(), limit, "Reply too large for UDP, truncating");
        encode(&truncated(&reply))
    }

    pub async fn handle_tcp(&self, query: &[u8], client: SocketAddr) -> Option<Vec<u8>> {
        let (reply, _) = self.handle(query, client, RequestProtocol::Tcp).await?;
        encode(&reply)
    }

    /// The reply plus the UDP payload size the client advertised (at least 512).
    async fn handle(
        &self,
        query: &[u8],
        client: SocketAddr,
        protocol: RequestProtocol,
    ) -> Option<(Message, u16)> {
        let message = match Message::from_vec(query) {
            Ok(message) => message,
            Err(e) => {
                debug!(client = %client, error = %e, "Undecodable query");
                return wire_id(query).map(|id| (format_error(id), DEFAULT_UDP_PAYLOAD));
            }
        };
        if message.message_type() != MessageType::Query {
            debug!(client = %client, "Ignoring non-query message");
            return None;
        }

        let max_payload = message.max_payload();
        let request = ForwardRequest::new(message, protocol).with_client(client);
        debug!(
            client = %client,
            protocol = %protocol,
            qname = ?request.qname(),
            qtype = ?request.qtype(),
            "DNS query received"
        );

        let ctx = RequestContext::with_timeout(self.query_timeout);
        let mut slot = ReplySlot::default();
        let reply = match self.handler.process(&ctx, &request, &mut slot).await {
            Ok(code) => match slot.reply {
                Some(reply) => reply,
                None => {
                    warn!(handler = self.handler.name(), rcode = ?code, "Handler wrote no reply");
                    error_reply(&request, ResponseCode::ServFail)
                }
            },
            Err(e) => {
                warn!(
                    client = %client,
                    qname = ?request.qname(),
                    error = %e,
                    "Query failed, answering SERVFAIL"
                );
                error_reply(&request, ResponseCode::ServFail)
            }
        };
        Some((reply, max_payload))
    }
}

fn encode(message: &Message) -> Option<Vec<u8>> {
    MessageBuilder::serialize(message)
        .map_err(|e| warn!(error = %e, "Failed to encode reply"))
        .ok()
}

fn format_error(id: u16) -> Message {
    let mut reply = Message::new(id, MessageType::Response, OpCode::Query);
    reply.set_response_code(ResponseCode::FormErr);
    reply
}

fn error_reply(request: &ForwardRequest, code: ResponseCode) -> Message {
    let mut reply = request.format_error_reply();
    reply.set_recursion_available(true);
    reply.set_response_code(code);
    reply
}

/// Header and question of `reply` with TC set.
fn truncated(reply: &Message) -> Message {
    let mut short = Message::new(reply.id(), MessageType::Response, reply.op_code());
    short.set_recursion_desired(reply.recursion_desired());
    short.set_recursion_available(reply.recursion_available());
    short.set_checking_disabled(reply.checking_disabled());
    short.set_response_code(reply.response_code());
    short.set_truncated(true);
    for query in reply.queries() {
        short.add_query(query.clone());
    }
    short
}
