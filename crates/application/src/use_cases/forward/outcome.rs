use fanout_dns_domain::DomainError;
use hickory_proto::op::Message;

/// Terminal result of one upstream worker for one query.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Message),
    /// The upstream answered something that does not belong to the query;
    /// carries the FORMERR reply synthesized for it.
    Malformed(Message),
    Failed(DomainError),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Malformed(_) => "malformed",
            Outcome::Failed(_) => "failed",
        }
    }
}
