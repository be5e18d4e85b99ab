//! Local filesystem backend.
//!
//! Performs native I/O against absolute host paths. Path selection is the
//! router's job; this backend never rewrites the paths it is given.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::BackingStore;
use crate::vfs::types::{DirEntry, FileAttr, FileType, OpenFlags};

/// Local filesystem backend.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    read_only: bool,
}

impl LocalBackend {
    /// Create a new read-write local backend.
    pub fn new() -> Self {
        Self { read_only: false }
    }

    /// Create a backend that refuses every mutation.
    pub fn read_only() -> Self {
        Self { read_only: true }
    }

    /// Set whether this backend is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Check if write operations are allowed.
    fn check_mutable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            perm: Self::perm_bits(meta),
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }

    #[cfg(unix)]
    fn perm_bits(meta: &std::fs::Metadata) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o7777
    }

    #[cfg(not(unix))]
    fn perm_bits(meta: &std::fs::Metadata) -> u32 {
        if meta.permissions().readonly() { 0o444 } else { 0o644 }
    }

    /// Entry kind without following links, like `lstat`.
    async fn entry_kind(entry: &fs::DirEntry) -> VfsResult<FileType> {
        let file_type = entry.file_type().await.map_err(VfsError::from)?;
        Ok(if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        })
    }
}

#[async_trait]
impl BackingStore for LocalBackend {
    async fn list(&self, dir: &Path) -> VfsResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut rd = fs::read_dir(dir)
            .await
            .map_err(|e| VfsError::from_io(dir, e))?;

        while let Some(entry) = rd.next_entry().await.map_err(VfsError::from)? {
            let kind = Self::entry_kind(&entry).await?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileAttr> {
        if flags.wants_write() {
            self.check_mutable()?;
        }

        // std refuses truncate without write access
        let write = flags.write || (flags.truncate && !flags.append);
        let file = fs::OpenOptions::new()
            .read(flags.read)
            .write(write)
            .append(flags.append)
            .truncate(flags.truncate)
            .open(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;

        let meta = file.metadata().await.map_err(VfsError::from)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = fs::File::open(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;

        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(VfsError::from)?;

        let mut buffer = Vec::with_capacity(size as usize);
        file.take(size as u64)
            .read_to_end(&mut buffer)
            .await
            .map_err(VfsError::from)?;

        Ok(buffer)
    }

    async fn check_writable(&self, path: &Path) -> bool {
        if self.read_only {
            return false;
        }

        #[cfg(unix)]
        {
            use rustix::fs::{Access, access};
            access(path, Access::WRITE_OK).is_ok()
        }

        #[cfg(not(unix))]
        {
            fs::metadata(path)
                .await
                .map(|meta| !meta.permissions().readonly())
                .unwrap_or(false)
        }
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        self.check_mutable()?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;

        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(VfsError::from)?;

        file.write_all(data).await.map_err(VfsError::from)?;
        file.flush().await.map_err(VfsError::from)?;

        Ok(data.len() as u32)
    }

    async fn create_file(&self, path: &Path, mode: u32, exclusive: bool) -> VfsResult<FileAttr> {
        self.check_mutable()?;

        let mut options = fs::OpenOptions::new();
        options.read(true).write(true);
        if exclusive {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let file = options
            .open(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))?;

        // The file exists at this point; a failing chmod leaves it usable.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(mode);
            if let Err(e) = fs::set_permissions(path, permissions).await {
                warn!(path = %path.display(), mode = %format!("{mode:o}"), "chmod failed: {e}");
            }
        }
        #[cfg(not(unix))]
        let _ = mode;

        let meta = file.metadata().await.map_err(VfsError::from)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn remove_file(&self, path: &Path) -> VfsResult<()> {
        self.check_mutable()?;
        fs::remove_file(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))
    }

    async fn make_dir_all(&self, path: &Path, mode: u32) -> VfsResult<()> {
        self.check_mutable()?;

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        builder.create(path).map_err(|e| VfsError::from_io(path, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        self.check_mutable()?;
        fs::remove_dir_all(path)
            .await
            .map_err(|e| VfsError::from_io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_mutable()?;

        // Ensure parent of destination exists
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(parent, e))?;
        }

        fs::rename(from, to)
            .await
            .map_err(|e| VfsError::from_io(from, e))
    }
}
