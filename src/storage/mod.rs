//! Storage layer abstraction.
//!
//! Progress is the only durable state. Backends implement
//! [`ProgressBackend`] and are injected into
//! [`ProgressStore`](crate::services::ProgressStore):
//! - **Filesystem**: one JSON document in the data directory
//! - **Memory**: tests and ephemeral sessions

pub mod persistence;
pub mod traits;

pub use persistence::{FilesystemBackend, MemoryBackend};
pub use traits::ProgressBackend;
