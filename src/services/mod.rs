//! Business logic services.
//!
//! Services orchestrate storage backends and provide high-level operations.

mod progress;

pub use progress::ProgressStore;
