pub mod health;
pub mod policy;

pub use health::UpstreamHealth;
pub use policy::{policy_from_config, RandomPolicy, RoundRobinPolicy, SequentialPolicy};
