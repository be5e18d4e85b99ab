//! Backing store trait.
//!
//! One native I/O operation against one concrete path. The namespace router
//! decides *which* path; implementations only perform the call.

use async_trait::async_trait;
use std::path::Path;

use super::VfsResult;
use super::types::{DirEntry, FileAttr, OpenFlags};

/// Native filesystem operations the router delegates to.
///
/// All paths are absolute backing paths. Errors are returned as-is to the
/// router, which passes them through to its caller without retry.
#[async_trait]
pub trait BackingStore: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// List the immediate children of a directory.
    async fn list(&self, dir: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Get file attributes.
    async fn stat(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Open an existing file with the given flags.
    ///
    /// Applies side effects such as truncation and returns the attributes
    /// after opening.
    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileAttr>;

    /// Read up to `size` bytes starting at `offset`.
    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    /// Whether the current process may write to `path`.
    async fn check_writable(&self, path: &Path) -> bool;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write `data` at `offset`, returning the number of bytes written.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// Create (or truncate) a file, then apply `mode`.
    ///
    /// With `exclusive` the call fails with `AlreadyExists` instead of
    /// truncating, atomically with the creation itself.
    async fn create_file(&self, path: &Path, mode: u32, exclusive: bool) -> VfsResult<FileAttr>;

    /// Remove a file.
    async fn remove_file(&self, path: &Path) -> VfsResult<()>;

    /// Create a directory and any missing parents.
    async fn make_dir_all(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Remove a directory and everything below it.
    async fn remove_dir_all(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}
