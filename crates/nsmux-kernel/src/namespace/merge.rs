//! Directory merge engine.
//!
//! Builds one listing for a virtual directory out of every backing tree that
//! contributes to it. Earlier sources shadow later ones by name.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::NamespaceConfig;
use crate::vfs::{BackingStore, DirEntry, FileType, VfsError, VfsResult};

use super::classify::{ClassifiedPath, candidates};

/// Ordered, unique-by-name directory listing.
#[derive(Debug, Default, Clone)]
pub struct MergedListing {
    entries: Vec<DirEntry>,
    seen: HashSet<String>,
}

impl MergedListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` unless its name is already present. Returns whether it
    /// was added.
    pub fn admit(&mut self, entry: DirEntry) -> bool {
        if self.seen.contains(&entry.name) {
            return false;
        }
        self.seen.insert(entry.name.clone());
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DirEntry> {
        self.entries
    }

    /// Entry names, in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

impl IntoIterator for MergedListing {
    type Item = DirEntry;
    type IntoIter = std::vec::IntoIter<DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Merge the listing for an already-classified directory.
pub async fn list_directory(
    config: &NamespaceConfig,
    store: &dyn BackingStore,
    classified: &ClassifiedPath<'_>,
) -> VfsResult<MergedListing> {
    match classified {
        ClassifiedPath::Root => Ok(list_root(config, store).await),
        ClassifiedPath::FirstPartyRoot => list_first_party_root(config, store).await,
        ClassifiedPath::PassThrough { relative } => {
            let dir = config.workspace_root().join(relative);
            let entries = store.list(&dir).await.map_err(|e| {
                debug!(dir = %dir.display(), "pass-through listing failed: {e}");
                VfsError::not_found(*relative)
            })?;
            let mut listing = MergedListing::new();
            for entry in entries {
                listing.admit(entry);
            }
            Ok(listing)
        }
        ClassifiedPath::FirstPartyChild { relative } | ClassifiedPath::VendorChild { relative } => {
            let mut listing = MergedListing::new();
            let mut any_listed = false;
            for location in candidates(config, classified) {
                match store.list(&location.path).await {
                    Ok(entries) => {
                        debug!(%location, count = entries.len(), "merging");
                        any_listed = true;
                        admit_filtered(config, &mut listing, entries);
                    }
                    Err(e) => debug!(%location, "skipping candidate: {e}"),
                }
            }
            if !any_listed {
                return Err(VfsError::not_found(*relative));
            }
            Ok(listing)
        }
    }
}

/// The virtual root: the first-party prefix, every vendor root's children,
/// then one entry per pass-through path.
async fn list_root(config: &NamespaceConfig, store: &dyn BackingStore) -> MergedListing {
    let mut listing = MergedListing::new();
    listing.admit(DirEntry::directory(config.first_party_prefix()));

    let ws = config.workspace_root();
    for vendor in config.vendor_roots() {
        let dir = ws.join(vendor);
        match store.list(&dir).await {
            Ok(entries) => admit_filtered(config, &mut listing, entries),
            Err(e) => debug!(dir = %dir.display(), "vendor root not listable: {e}"),
        }
    }

    for pass_through in config.pass_through_paths() {
        let path = ws.join(pass_through);
        match store.stat(&path).await {
            Ok(attr) => {
                let name = final_segment(pass_through);
                listing.admit(DirEntry::new(name, attr.kind));
            }
            Err(e) => warn!(path = %path.display(), "pass-through entry unavailable: {e}"),
        }
    }

    listing
}

/// The first-party root: directories directly under the workspace, minus
/// ignored names, vendor roots and pass-through names.
async fn list_first_party_root(
    config: &NamespaceConfig,
    store: &dyn BackingStore,
) -> VfsResult<MergedListing> {
    let ws = config.workspace_root();
    let entries = store.list(ws).await.map_err(|e| {
        debug!(dir = %ws.display(), "workspace not listable: {e}");
        VfsError::not_found(config.first_party_prefix())
    })?;

    let mut listing = MergedListing::new();
    for entry in entries {
        if entry.kind != FileType::Directory
            || config.ignored_names().contains(&entry.name)
            || config.is_vendor_dir(&entry.name)
            || config.is_excluded(&entry.name)
        {
            continue;
        }
        listing.admit(entry);
    }
    Ok(listing)
}

fn admit_filtered(config: &NamespaceConfig, listing: &mut MergedListing, entries: Vec<DirEntry>) {
    for entry in entries {
        if config.is_excluded(&entry.name) {
            continue;
        }
        listing.admit(entry);
    }
}

fn final_segment(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::classify::classify;
    use crate::vfs::MemoryBackend;

    fn config() -> NamespaceConfig {
        NamespaceConfig::new("src", "/w")
            .with_vendors(["vendor", "third_party/go"])
            .with_pass_through(["tools"])
            .with_ignored(["bazel-bin"])
    }

    async fn list(config: &NamespaceConfig, store: &MemoryBackend, path: &str) -> VfsResult<Vec<String>> {
        let classified = classify(config, path);
        let listing = list_directory(config, store, &classified).await?;
        Ok(listing.names().map(String::from).collect())
    }

    #[test]
    fn test_admit_first_wins() {
        let mut listing = MergedListing::new();
        assert!(listing.admit(DirEntry::file("a")));
        assert!(!listing.admit(DirEntry::directory("a")));
        assert!(listing.admit(DirEntry::file("b")));
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.entries()[0].kind, FileType::File);
    }

    #[tokio::test]
    async fn test_root_always_has_prefix() {
        let c = NamespaceConfig::new("src", "/w");
        let store = MemoryBackend::new();
        assert_eq!(list(&c, &store, "").await.unwrap(), vec!["src"]);
    }

    #[tokio::test]
    async fn test_root_merges_vendors_and_pass_through() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_dir("/w/vendor/golang.org").unwrap();
        store.add_dir("/w/vendor/tools").unwrap();
        store.add_dir("/w/third_party/go/gopkg.in").unwrap();
        store.add_file("/w/tools/gen.txt", "x").unwrap();

        let names = list(&c, &store, "").await.unwrap();
        assert_eq!(names, vec!["src", "golang.org", "gopkg.in", "tools"]);
    }

    #[tokio::test]
    async fn test_root_skips_missing_pass_through() {
        let c = config();
        let store = MemoryBackend::new();
        assert_eq!(list(&c, &store, "").await.unwrap(), vec!["src"]);
    }

    #[tokio::test]
    async fn test_first_party_root_filters() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_dir("/w/pkg1").unwrap();
        store.add_dir("/w/vendor").unwrap();
        store.add_dir("/w/third_party").unwrap();
        store.add_dir("/w/bazel-bin").unwrap();
        store.add_dir("/w/tools").unwrap();
        store.add_file("/w/README.md", "").unwrap();

        assert_eq!(list(&c, &store, "src").await.unwrap(), vec!["pkg1"]);
    }

    #[tokio::test]
    async fn test_first_party_root_missing_workspace() {
        let c = config();
        let store = MemoryBackend::new();
        let err = list(&c, &store, "src").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_first_party_child_union_with_genfiles() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_file("/w/pkg1/a.go", "").unwrap();
        store.add_file("/w/pkg1/shared.go", "ws").unwrap();
        store.add_file("/w/bazel-genfiles/pkg1/gen.pb.go", "").unwrap();
        store.add_dir("/w/bazel-genfiles/pkg1/shared.go").unwrap();

        let classified = classify(&c, "src/pkg1");
        let listing = list_directory(&c, &store, &classified).await.unwrap();
        let mut names: Vec<_> = listing.names().collect();
        names.sort();
        assert_eq!(names, vec!["a.go", "gen.pb.go", "shared.go"]);

        // The workspace copy shadows the genfiles one
        let shared = listing.entries().iter().find(|e| e.name == "shared.go").unwrap();
        assert_eq!(shared.kind, FileType::File);
    }

    #[tokio::test]
    async fn test_genfiles_only_directory() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_file("/w/bazel-genfiles/proto/x.pb.go", "").unwrap();
        assert_eq!(list(&c, &store, "src/proto").await.unwrap(), vec!["x.pb.go"]);
    }

    #[tokio::test]
    async fn test_child_listing_excludes_pass_through_names() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_dir("/w/pkg1/tools").unwrap();
        store.add_file("/w/pkg1/main.go", "").unwrap();
        store.add_dir("/w/vendor/lib/tools").unwrap();

        assert_eq!(list(&c, &store, "src/pkg1").await.unwrap(), vec!["main.go"]);
        assert!(list(&c, &store, "lib").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vendor_child_merges_in_priority_order() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_file("/w/vendor/lib/a.go", "").unwrap();
        store.add_dir("/w/third_party/go/lib/a.go").unwrap();
        store.add_file("/w/third_party/go/lib/b.go", "").unwrap();

        let classified = classify(&c, "lib");
        let listing = list_directory(&c, &store, &classified).await.unwrap();
        assert_eq!(listing.names().collect::<Vec<_>>(), vec!["a.go", "b.go"]);
        assert_eq!(listing.entries()[0].kind, FileType::File);
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let c = config();
        let store = MemoryBackend::new();
        assert!(list(&c, &store, "src/nope").await.unwrap_err().is_not_found());
        assert!(list(&c, &store, "nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_an_error() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_dir("/w/pkg1").unwrap();
        assert!(list(&c, &store, "src/pkg1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pass_through_listing_is_verbatim() {
        let c = config();
        let store = MemoryBackend::new();
        store.add_file("/w/tools/gen.txt", "").unwrap();
        store.add_dir("/w/tools/tools").unwrap();

        let mut names = list(&c, &store, "tools").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["gen.txt", "tools"]);
        assert!(list(&c, &store, "tools/missing").await.unwrap_err().is_not_found());
    }
}
