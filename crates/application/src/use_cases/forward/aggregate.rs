use super::outcome::Outcome;
use fanout_dns_domain::DomainError;
use hickory_proto::op::Message;
use hickory_proto::rr::{Record, RecordType};
use tracing::debug;

fn is_address(record: &Record) -> bool {
    matches!(record.record_type(), RecordType::A | RecordType::AAAA)
}

/// Merges the A/AAAA answers of every successful outcome into one reply.
///
/// The reply that last contributed address records supplies the header and
/// question. With no address records at all, the first failure is returned,
/// or `NoHealthyUpstream` when there is none. Answers without address records
/// (NODATA, NXDOMAIN, CNAME-only) therefore count as "nothing collected".
pub fn synthesize(outcomes: Vec<Outcome>) -> Result<Message, DomainError> {
    let mut template: Option<Message> = None;
    let mut answers: Vec<Record> = Vec::with_capacity(outcomes.len());
    let mut first_error: Option<DomainError> = None;

    for outcome in outcomes {
        match outcome {
            Outcome::Success(reply) => {
                let before = answers.len();
                answers.extend(reply.answers().iter().filter(|r| is_address(r)).cloned());
                if answers.len() > before {
                    template = Some(reply);
                }
            }
            Outcome::Failed(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Outcome::Malformed(_) => {}
        }
    }

    if let Some(mut reply) = template {
        debug!(answers = answers.len(), "Synthesized aggregated reply");
        reply.take_answers();
        reply.insert_answers(answers);
        return Ok(reply);
    }

    Err(first_error.unwrap_or(DomainError::NoHealthyUpstream))
}
