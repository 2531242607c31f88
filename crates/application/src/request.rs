use fanout_dns_domain::RequestProtocol;
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use std::net::SocketAddr;

/// An inbound query as seen by the forwarder.
///
/// Immutable once built; the forwarder shares it read-only with every
/// upstream worker of the same fan-out.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    message: Message,
    protocol: RequestProtocol,
    client: Option<SocketAddr>,
}

impl ForwardRequest {
    pub fn new(message: Message, protocol: RequestProtocol) -> Self {
        Self {
            message,
            protocol,
            client: None,
        }
    }

    pub fn with_client(mut self, client: SocketAddr) -> Self {
        self.client = Some(client);
        self
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn id(&self) -> u16 {
        self.message.id()
    }

    pub fn protocol(&self) -> RequestProtocol {
        self.protocol
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    pub fn question(&self) -> Option<&Query> {
        self.message.queries().first()
    }

    pub fn qname(&self) -> Option<&Name> {
        self.question().map(|q| q.name())
    }

    pub fn qtype(&self) -> Option<RecordType> {
        self.question().map(|q| q.query_type())
    }

    /// Checks that `reply` answers this query: same id, response bit set and
    /// a single question equal to ours (name compared case-insensitively).
    pub fn matches_reply(&self, reply: &Message) -> bool {
        let Some(question) = self.question() else {
            return false;
        };
        if reply.id() != self.id() || reply.message_type() != MessageType::Response {
            return false;
        }
        let [answered] = reply.queries() else {
            return false;
        };
        answered.query_type() == question.query_type()
            && answered.query_class() == question.query_class()
            && same_name(answered.name(), question.name())
    }

    /// A FORMERR reply addressed to this query.
    pub fn format_error_reply(&self) -> Message {
        let mut reply = Message::new(self.id(), MessageType::Response, self.message.op_code());
        reply.set_recursion_desired(self.message.recursion_desired());
        reply.set_checking_disabled(self.message.checking_disabled());
        if let Some(question) = self.question() {
            reply.add_query(question.clone());
        }
        reply.set_response_code(ResponseCode::FormErr);
        reply
    }
}

/// Label-wise, case-insensitive name equality that ignores the FQDN flag.
pub(crate) fn same_name(a: &Name, b: &Name) -> bool {
    a.num_labels() == b.num_labels() && a.zone_of(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::OpCode;
    use std::str::FromStr;

    fn query(id: u16, name: &str, record_type: RecordType) -> Message {
        let mut message = Message::new(id, MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
        message
    }

    fn response_to(message: &Message) -> Message {
        let mut reply = Message::new(message.id(), MessageType::Response, OpCode::Query);
        for q in message.queries() {
            reply.add_query(q.clone());
        }
        reply
    }

    #[test]
    fn test_matching_reply() {
        let request = ForwardRequest::new(query(42, "example.org.", RecordType::A), RequestProtocol::Udp);
        let reply = response_to(request.message());
        assert!(request.matches_reply(&reply));
    }

    #[test]
    fn test_reply_name_case_is_ignored() {
        let request = ForwardRequest::new(query(42, "example.org.", RecordType::A), RequestProtocol::Udp);
        let reply = response_to(&query(42, "EXAMPLE.org.", RecordType::A));
        assert!(request.matches_reply(&reply));
    }

    #[test]
    fn test_reply_with_wrong_id_does_not_match() {
        let request = ForwardRequest::new(query(42, "example.org.", RecordType::A), RequestProtocol::Udp);
        let reply = response_to(&query(43, "example.org.", RecordType::A));
        assert!(!request.matches_reply(&reply));
    }

    #[test]
    fn test_reply_with_wrong_question_does_not_match() {
        let request = ForwardRequest::new(query(42, "example.org.", RecordType::A), RequestProtocol::Udp);
        assert!(!request.matches_reply(&response_to(&query(42, "example.net.", RecordType::A))));
        assert!(!request.matches_reply(&response_to(&query(42, "example.org.", RecordType::AAAA))));
    }

    #[test]
    fn test_query_echo_is_not_a_reply() {
        let request = ForwardRequest::new(query(42, "example.org.", RecordType::A), RequestProtocol::Udp);
        assert!(!request.matches_reply(request.message()));
    }

    #[test]
    fn test_format_error_reply() {
        let request = ForwardRequest::new(query(7, "example.org.", RecordType::AAAA), RequestProtocol::Tcp);
        let reply = request.format_error_reply();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert_eq!(reply.response_code(), ResponseCode::FormErr);
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries().len(), 1);
        assert!(reply.answers().is_empty());
    }
}
