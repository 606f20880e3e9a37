//! Storage backend traits.

mod progress;

pub use progress::ProgressBackend;
