//! File and mutation routing.
//!
//! Reads walk the candidate list and stop at the first backing location that
//! exists. Mutations never search: each class of path has exactly one
//! target root.

use tracing::debug;

use crate::config::NamespaceConfig;
use crate::vfs::{BackingStore, OpenFlags, VfsError, VfsResult};

use super::classify::{BackingLocation, ClassifiedPath, RootKind, file_candidates};

/// What a mutation is about to do to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Remove,
}

/// Find the backing location an open should use.
///
/// The first candidate that exists wins, even when it turns out not to be
/// writable: a write open of a read-only hit is `PermissionDenied`, never a
/// fall-through to a lower-priority root.
pub async fn resolve_for_read(
    config: &NamespaceConfig,
    store: &dyn BackingStore,
    classified: &ClassifiedPath<'_>,
    flags: OpenFlags,
) -> VfsResult<BackingLocation> {
    for location in file_candidates(config, classified) {
        match store.stat(&location.path).await {
            Ok(_) => {
                if flags.wants_write() && !store.check_writable(&location.path).await {
                    debug!(%location, "first match not writable");
                    return Err(VfsError::permission_denied(location.path.display().to_string()));
                }
                debug!(%location, "resolved");
                return Ok(location);
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    Err(VfsError::not_found(describe(classified)))
}

/// Find the single backing location a create or remove should touch.
///
/// First-party paths always go to the workspace (never the genfiles shadow),
/// vendor paths always go to the first vendor root.
pub fn resolve_for_mutation(
    config: &NamespaceConfig,
    classified: &ClassifiedPath<'_>,
    kind: MutationKind,
) -> VfsResult<BackingLocation> {
    let ws = config.workspace_root();
    let location = match *classified {
        ClassifiedPath::Root => {
            return Err(VfsError::unsupported("the virtual root is read-only"));
        }
        ClassifiedPath::FirstPartyRoot => {
            if kind == MutationKind::Remove {
                return Err(VfsError::unsupported("cannot remove the first-party root"));
            }
            BackingLocation::new(RootKind::Workspace, ws)
        }
        ClassifiedPath::FirstPartyChild { relative } => {
            BackingLocation::new(RootKind::Workspace, ws.join(relative))
        }
        ClassifiedPath::PassThrough { relative } => {
            BackingLocation::new(RootKind::PassThrough, ws.join(relative))
        }
        ClassifiedPath::VendorChild { relative } => {
            let vendor = config.vendor_roots().first().ok_or_else(|| {
                VfsError::unsupported(format!("no vendor root configured for {relative}"))
            })?;
            BackingLocation::new(RootKind::Vendor(0), ws.join(vendor).join(relative))
        }
    };
    debug!(?kind, %location, "mutation target");
    Ok(location)
}

/// Find the backing paths for both sides of a rename.
///
/// Both sides must land in the same root. A vendor rename goes to the first
/// vendor that currently holds the old path; when none does the rename fails
/// rather than guessing.
pub async fn resolve_rename(
    config: &NamespaceConfig,
    store: &dyn BackingStore,
    old: &ClassifiedPath<'_>,
    new: &ClassifiedPath<'_>,
) -> VfsResult<(BackingLocation, BackingLocation)> {
    let ws = config.workspace_root();
    let pair = match (*old, *new) {
        (
            ClassifiedPath::FirstPartyChild { relative: from },
            ClassifiedPath::FirstPartyChild { relative: to },
        ) => (
            BackingLocation::new(RootKind::Workspace, ws.join(from)),
            BackingLocation::new(RootKind::Workspace, ws.join(to)),
        ),
        (
            ClassifiedPath::PassThrough { relative: from },
            ClassifiedPath::PassThrough { relative: to },
        ) => (
            BackingLocation::new(RootKind::PassThrough, ws.join(from)),
            BackingLocation::new(RootKind::PassThrough, ws.join(to)),
        ),
        (
            ClassifiedPath::VendorChild { relative: from },
            ClassifiedPath::VendorChild { relative: to },
        ) => {
            let mut found = None;
            for (i, vendor) in config.vendor_roots().iter().enumerate() {
                let root = ws.join(vendor);
                if store.exists(&root.join(from)).await {
                    found = Some((i, root));
                    break;
                }
            }
            let (i, root) = found.ok_or_else(|| {
                VfsError::unsupported(format!("{from} is not present in any vendor root"))
            })?;
            (
                BackingLocation::new(RootKind::Vendor(i), root.join(from)),
                BackingLocation::new(RootKind::Vendor(i), root.join(to)),
            )
        }
        _ => {
            return Err(VfsError::unsupported(format!(
                "cannot rename {} to {}",
                describe(old),
                describe(new)
            )));
        }
    };
    debug!(from = %pair.0, to = %pair.1, "rename target");
    Ok(pair)
}

/// Human-readable virtual path for error messages.
fn describe(classified: &ClassifiedPath<'_>) -> String {
    match *classified {
        ClassifiedPath::Root => "/".to_string(),
        ClassifiedPath::FirstPartyRoot => "<first-party root>".to_string(),
        ClassifiedPath::FirstPartyChild { relative }
        | ClassifiedPath::PassThrough { relative }
        | ClassifiedPath::VendorChild { relative } => relative.to_string(),
    }
}
