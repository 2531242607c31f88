mod dns_handler;
mod selection_policy;
mod upstream;

pub use dns_handler::{DnsHandler, ResponseSink};
pub use selection_policy::SelectionPolicy;
pub use upstream::Upstream;
