use crate::context::RequestContext;
use crate::request::ForwardRequest;
use async_trait::async_trait;
use fanout_dns_domain::DomainError;
use hickory_proto::op::{Message, ResponseCode};

/// Where a handler writes the reply for the query it is processing.
#[async_trait]
pub trait ResponseSink: Send {
    async fn write_message(&mut self, message: Message) -> Result<(), DomainError>;
}

/// A link in the query handler chain.
///
/// `Ok(code)` means a reply has been written to the sink. `Err(e)` means
/// nothing was written; the server answers SERVFAIL.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        ctx: &RequestContext,
        request: &ForwardRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<ResponseCode, DomainError>;
}
