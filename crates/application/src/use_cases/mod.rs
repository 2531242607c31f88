pub mod forward;

pub use forward::{Admission, Forward, Outcome};
