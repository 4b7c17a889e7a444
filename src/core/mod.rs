pub mod errors;

pub use errors::{QueueError, Result};
