//! # nsmux-kernel
//!
//! Virtual directory-namespace router.
//!
//! One client-visible tree, many backing trees:
//! - the first-party prefix maps onto the workspace
//! - everything else is looked up in the vendor trees, in priority order
//! - pass-through paths go to the workspace verbatim
//! - a generated-output shadow sits behind the workspace and each vendor
//! - a reserved segment in the first-party tree opens files from the SDK
//!
//! The router is pure routing. It owns no file handles and no caches; all
//! I/O goes through a [`BackingStore`].

pub mod config;
pub mod namespace;
pub mod vfs;

pub use config::{ConfigError, NamespaceConfig, default_config_path};
pub use namespace::{
    BackingLocation, ClassifiedPath, MergedListing, MutationKind, Namespace, OpenFile, RootKind,
};
pub use vfs::{
    BackingStore, DirEntry, ErrorKind, FileAttr, FileType, LocalBackend, MemoryBackend, OpenFlags,
    VfsError, VfsResult,
};
