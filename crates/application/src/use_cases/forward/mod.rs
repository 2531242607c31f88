mod admission;
mod aggregate;
mod coordinator;
mod outcome;
mod retry;

pub use admission::{parse_zone, Admission};
pub use aggregate::synthesize;
pub use coordinator::Forward;
pub use outcome::Outcome;
pub use retry::{RetryLoop, MAX_UNCOUNTED_RETRIES};
