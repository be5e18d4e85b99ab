//! Backing store abstraction.
//!
//! Key components:
//!
//! - [`BackingStore`] - One native I/O call against one concrete path
//! - [`LocalBackend`] - Native filesystem access
//! - [`MemoryBackend`] - In-memory tree (tests, dry runs)
//!
//! ## Design Decisions
//!
//! - **Absolute paths only**: the namespace router has already picked the
//!   backing root, so backends never translate paths.
//! - **Explicit offset/size**: read/write take offset and size, so an opened
//!   file needs no handle state beyond its backing path.

pub mod backends;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{ErrorKind, VfsError, VfsResult};
pub use ops::BackingStore;
pub use types::{DirEntry, FileAttr, FileType, OpenFlags};
