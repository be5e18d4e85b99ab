//! Virtual namespace router.
//!
//! Presents the workspace, its vendor trees, pass-through trees, the
//! genfiles shadow and the SDK overlay as one directory tree.
//!
//! Key components:
//!
//! - [`classify`] - Pure path classification and candidate locations
//! - [`merge`] - Directory listings merged across backing roots
//! - [`route`] - Single-target resolution for opens and mutations
//! - [`Namespace`] - The driver-facing verbs
//!
//! ## Design Decisions
//!
//! - **Stateless routing**: the router holds an immutable config and a
//!   backing store, nothing else. Requests may run on any number of tasks.
//! - **No rollback**: each verb is at most one native mutation; a failure
//!   is passed through as-is.
//! - **First match is authoritative**: an open never falls through past a
//!   candidate that exists.

pub mod classify;
pub mod merge;
pub mod route;

use std::sync::Arc;

use tracing::debug;

use crate::config::NamespaceConfig;
use crate::vfs::{BackingStore, DirEntry, FileAttr, OpenFlags, VfsError, VfsResult};

pub use classify::{BackingLocation, ClassifiedPath, RootKind};
pub use merge::MergedListing;
pub use route::MutationKind;

use classify::{classify, file_candidates, normalize_virtual};

/// Permission bits reported for synthesized directories.
const SYNTHETIC_DIR_PERM: u32 = 0o555;

/// A file opened through the namespace.
///
/// Carries the backing location chosen at open time, so later reads and
/// writes go to the same root even if the namespace changes underneath.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub location: BackingLocation,
    pub attr: FileAttr,
    pub flags: OpenFlags,
}

/// The unified namespace.
pub struct Namespace {
    config: Arc<NamespaceConfig>,
    store: Arc<dyn BackingStore>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("config", &self.config)
            .field("store", &"<dyn BackingStore>")
            .finish()
    }
}

impl Namespace {
    pub fn new(config: Arc<NamespaceConfig>, store: Arc<dyn BackingStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Classify a normalized virtual path (no leading or trailing `/`).
    pub fn classify<'a>(&self, path: &'a str) -> ClassifiedPath<'a> {
        classify(&self.config, path)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Backing location an open with `flags` would use.
    pub async fn resolve_read(&self, path: &str, flags: OpenFlags) -> VfsResult<BackingLocation> {
        let path = normalize_virtual(path);
        let classified = classify(&self.config, &path);
        route::resolve_for_read(&self.config, self.store.as_ref(), &classified, flags).await
    }

    /// Backing location a create or remove would touch.
    pub fn resolve_mutation(&self, path: &str, kind: MutationKind) -> VfsResult<BackingLocation> {
        let path = normalize_virtual(path);
        route::resolve_for_mutation(&self.config, &classify(&self.config, &path), kind)
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// List a virtual directory.
    #[tracing::instrument(skip(self), name = "ns.list")]
    pub async fn list_directory(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = normalize_virtual(path);
        let classified = classify(&self.config, &path);
        let listing = merge::list_directory(&self.config, self.store.as_ref(), &classified).await?;
        debug!(?classified, count = listing.len(), "listed");
        Ok(listing.into_entries())
    }

    /// Create a directory (and missing parents) in its owning root.
    #[tracing::instrument(skip(self), name = "ns.mkdir")]
    pub async fn make_directory(&self, path: &str, mode: u32) -> VfsResult<()> {
        let location = self.resolve_mutation(path, MutationKind::Create)?;
        self.store.make_dir_all(&location.path, mode).await
    }

    /// Remove a directory tree from its owning root.
    #[tracing::instrument(skip(self), name = "ns.rmdir")]
    pub async fn remove_directory(&self, path: &str) -> VfsResult<()> {
        let location = self.resolve_mutation(path, MutationKind::Remove)?;
        self.store.remove_dir_all(&location.path).await
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Open an existing file.
    #[tracing::instrument(skip(self), name = "ns.open")]
    pub async fn open_file(&self, path: &str, flags: OpenFlags) -> VfsResult<OpenFile> {
        let location = self.resolve_read(path, flags).await?;
        let attr = self.store.open(&location.path, flags).await?;
        Ok(OpenFile {
            location,
            attr,
            flags,
        })
    }

    /// Create (or truncate) a file in its owning root and apply `mode`.
    #[tracing::instrument(skip(self), name = "ns.create")]
    pub async fn create_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<OpenFile> {
        let location = self.resolve_mutation(path, MutationKind::Create)?;
        let attr = self
            .store
            .create_file(&location.path, mode, flags.exclusive)
            .await?;
        debug!(%location, "created");
        Ok(OpenFile {
            location,
            attr,
            flags,
        })
    }

    /// Remove a file from its owning root.
    #[tracing::instrument(skip(self), name = "ns.unlink")]
    pub async fn unlink_file(&self, path: &str) -> VfsResult<()> {
        let location = self.resolve_mutation(path, MutationKind::Remove)?;
        self.store.remove_file(&location.path).await
    }

    /// Rename within a single backing root.
    #[tracing::instrument(skip(self), name = "ns.rename")]
    pub async fn rename_file(&self, old: &str, new: &str) -> VfsResult<()> {
        let old = normalize_virtual(old);
        let new = normalize_virtual(new);
        let (from, to) = route::resolve_rename(
            &self.config,
            self.store.as_ref(),
            &classify(&self.config, &old),
            &classify(&self.config, &new),
        )
        .await?;
        self.store.rename(&from.path, &to.path).await
    }

    /// Attributes of a virtual path.
    ///
    /// The root and the first-party root are synthesized; anything else
    /// reports the first candidate that exists.
    ///
    /// Resolution follows `open_file`, not `list_directory`: a path under
    /// the SDK marker stats the SDK tree, even where listing the same path
    /// looks in the workspace and finds nothing.
    #[tracing::instrument(skip(self), name = "ns.stat")]
    pub async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        let path = normalize_virtual(path);
        let classified = classify(&self.config, &path);
        if matches!(classified, ClassifiedPath::Root | ClassifiedPath::FirstPartyRoot) {
            return Ok(FileAttr::directory(SYNTHETIC_DIR_PERM));
        }
        for location in file_candidates(&self.config, &classified) {
            match self.store.stat(&location.path).await {
                Ok(attr) => return Ok(attr),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(VfsError::not_found(path.into_owned()))
    }

    /// Read from an open file.
    #[tracing::instrument(skip(self, file), name = "ns.read", fields(path = %file.location.path.display()))]
    pub async fn read(&self, file: &OpenFile, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        self.store.read(&file.location.path, offset, size).await
    }

    /// Write to an open file.
    #[tracing::instrument(skip(self, file, data), name = "ns.write", fields(path = %file.location.path.display()))]
    pub async fn write(&self, file: &OpenFile, offset: u64, data: &[u8]) -> VfsResult<u32> {
        if !file.flags.wants_write() {
            return Err(VfsError::permission_denied(
                file.location.path.display().to_string(),
            ));
        }
        self.store.write(&file.location.path, offset, data).await
    }
}
