//! Backing store implementations.
//!
//! Backends implement [`BackingStore`](super::BackingStore) for different
//! storage types.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
