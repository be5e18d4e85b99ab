//! Namespace classifier.
//!
//! Maps a virtual path onto the part of the namespace it belongs to and, from
//! there, onto the backing locations that may hold it. Classification is a
//! pure function of the path and the [`NamespaceConfig`]; it never touches
//! the filesystem and never fails.

use std::fmt;
use std::path::PathBuf;

use crate::config::NamespaceConfig;

/// Which backing root a location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// The primary workspace tree.
    Workspace,
    /// A vendor tree, by priority index into the vendor list.
    Vendor(usize),
    /// A pass-through tree under the workspace.
    PassThrough,
    /// The generated-output shadow tree.
    GenfilesShadow,
    /// The SDK overlay.
    Sdk,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Workspace => write!(f, "workspace"),
            RootKind::Vendor(i) => write!(f, "vendor[{i}]"),
            RootKind::PassThrough => write!(f, "pass-through"),
            RootKind::GenfilesShadow => write!(f, "genfiles"),
            RootKind::Sdk => write!(f, "sdk"),
        }
    }
}

/// A resolved backing location: which root, and the absolute path in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingLocation {
    pub kind: RootKind,
    pub path: PathBuf,
}

impl BackingLocation {
    pub fn new(kind: RootKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for BackingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.display())
    }
}

/// Where a virtual path lives in the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedPath<'a> {
    /// The virtual root.
    Root,
    /// The first-party prefix directory itself.
    FirstPartyRoot,
    /// Below the first-party prefix; `relative` has the prefix stripped.
    FirstPartyChild { relative: &'a str },
    /// Inside a pass-through tree; `relative` is the whole path.
    PassThrough { relative: &'a str },
    /// Anything else, looked up in every vendor tree.
    VendorChild { relative: &'a str },
}

impl ClassifiedPath<'_> {
    /// True for the two first-party classes.
    pub fn is_first_party(&self) -> bool {
        matches!(
            self,
            ClassifiedPath::FirstPartyRoot | ClassifiedPath::FirstPartyChild { .. }
        )
    }
}

/// Strip leading/trailing slashes and collapse empty segments.
///
/// Returns the path unchanged (borrowed) when it is already clean, which is
/// the common case for driver-supplied paths.
pub fn normalize_virtual(path: &str) -> std::borrow::Cow<'_, str> {
    let trimmed = path.trim_matches('/');
    if !trimmed.contains("//") {
        return std::borrow::Cow::Borrowed(trimmed);
    }
    let joined = trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    std::borrow::Cow::Owned(joined)
}

/// Classify a normalized virtual path. First match wins:
///
/// 1. `""` is the root
/// 2. the prefix itself is the first-party root
/// 3. `prefix/...` is first-party
/// 4. a pass-through entry, or anything below one, is pass-through
/// 5. everything else is a vendor path
pub fn classify<'a>(config: &NamespaceConfig, path: &'a str) -> ClassifiedPath<'a> {
    if path.is_empty() {
        return ClassifiedPath::Root;
    }

    let prefix = config.first_party_prefix();
    if path == prefix {
        return ClassifiedPath::FirstPartyRoot;
    }
    if let Some(relative) = strip_segment_prefix(path, prefix) {
        return ClassifiedPath::FirstPartyChild { relative };
    }

    if config
        .pass_through_paths()
        .iter()
        .any(|p| path == p || strip_segment_prefix(path, p).is_some())
    {
        return ClassifiedPath::PassThrough { relative: path };
    }

    ClassifiedPath::VendorChild { relative: path }
}

/// `path` minus `prefix/`, if `path` lies strictly below `prefix`.
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix)?.strip_prefix('/')
}

/// If `relative` points into the SDK overlay, the remainder below the marker.
pub fn sdk_remainder<'a>(config: &NamespaceConfig, relative: &'a str) -> Option<&'a str> {
    config.sdk_root()?;
    let marker = config.sdk_marker();
    if relative == marker {
        return Some("");
    }
    strip_segment_prefix(relative, marker)
}

/// Join a relative virtual path onto a backing root.
fn join(root: PathBuf, relative: &str) -> PathBuf {
    if relative.is_empty() {
        root
    } else {
        root.join(relative)
    }
}

/// Candidate backing locations for a classified path, in priority order.
///
/// Lazy: nothing is computed for a candidate until the consumer asks for it,
/// so a router that stops at the first hit never builds the rest.
///
/// - first-party: workspace, then its genfiles shadow
/// - vendor: for each vendor in order, the vendor tree then its shadow
/// - pass-through: the workspace path, verbatim
/// - root / first-party root: none (they are synthesized)
pub fn candidates<'c>(
    config: &'c NamespaceConfig,
    classified: &ClassifiedPath<'c>,
) -> Box<dyn Iterator<Item = BackingLocation> + Send + 'c> {
    let ws = config.workspace_root();
    match *classified {
        ClassifiedPath::Root | ClassifiedPath::FirstPartyRoot => Box::new(std::iter::empty()),
        ClassifiedPath::FirstPartyChild { relative } => Box::new(
            [RootKind::Workspace, RootKind::GenfilesShadow]
                .into_iter()
                .map(move |kind| match kind {
                    RootKind::Workspace => {
                        BackingLocation::new(kind, join(ws.to_path_buf(), relative))
                    }
                    _ => BackingLocation::new(kind, join(config.genfiles_root(), relative)),
                }),
        ),
        ClassifiedPath::PassThrough { relative } => Box::new(std::iter::once(
            BackingLocation::new(RootKind::PassThrough, join(ws.to_path_buf(), relative)),
        )),
        ClassifiedPath::VendorChild { relative } => Box::new(
            config
                .vendor_roots()
                .iter()
                .enumerate()
                .flat_map(move |(i, vendor)| {
                    [
                        BackingLocation::new(
                            RootKind::Vendor(i),
                            join(ws.join(vendor), relative),
                        ),
                        BackingLocation::new(
                            RootKind::GenfilesShadow,
                            join(config.genfiles_root().join(vendor), relative),
                        ),
                    ]
                }),
        ),
    }
}

/// Candidates for opening a file: like [`candidates`], except that a
/// first-party path under the SDK marker resolves only into the SDK root.
pub fn file_candidates<'c>(
    config: &'c NamespaceConfig,
    classified: &ClassifiedPath<'c>,
) -> Box<dyn Iterator<Item = BackingLocation> + Send + 'c> {
    if let ClassifiedPath::FirstPartyChild { relative } = *classified {
        if let (Some(remainder), Some(sdk)) = (sdk_remainder(config, relative), config.sdk_root())
        {
            return Box::new(std::iter::once(BackingLocation::new(
                RootKind::Sdk,
                join(sdk.to_path_buf(), remainder),
            )));
        }
    }
    candidates(config, classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> NamespaceConfig {
        NamespaceConfig::new("github.com/acme/app", "/w")
            .with_sdk_root("/sdk")
            .with_vendors(["vendor", "third_party/go"])
            .with_pass_through(["tools", "BUILD"])
    }

    fn paths(it: impl Iterator<Item = BackingLocation>) -> Vec<(RootKind, PathBuf)> {
        it.map(|l| (l.kind, l.path)).collect()
    }

    #[test]
    fn test_classification_order() {
        let c = config();
        assert_eq!(classify(&c, ""), ClassifiedPath::Root);
        assert_eq!(classify(&c, "github.com/acme/app"), ClassifiedPath::FirstPartyRoot);
        assert_eq!(
            classify(&c, "github.com/acme/app/pkg/x.go"),
            ClassifiedPath::FirstPartyChild {
                relative: "pkg/x.go"
            }
        );
        assert_eq!(
            classify(&c, "tools"),
            ClassifiedPath::PassThrough { relative: "tools" }
        );
        assert_eq!(
            classify(&c, "tools/gen.txt"),
            ClassifiedPath::PassThrough {
                relative: "tools/gen.txt"
            }
        );
        assert_eq!(
            classify(&c, "golang.org/x/net"),
            ClassifiedPath::VendorChild {
                relative: "golang.org/x/net"
            }
        );
    }

    #[test]
    fn test_prefix_match_is_segment_aware() {
        let c = config();
        // A sibling that merely shares the prefix string is not first-party
        assert_eq!(
            classify(&c, "github.com/acme/apps/lib"),
            ClassifiedPath::VendorChild {
                relative: "github.com/acme/apps/lib"
            }
        );
        assert_eq!(
            classify(&c, "toolsmith/x"),
            ClassifiedPath::VendorChild {
                relative: "toolsmith/x"
            }
        );
    }

    #[test]
    fn test_normalize_virtual() {
        assert_eq!(normalize_virtual(""), "");
        assert_eq!(normalize_virtual("/"), "");
        assert_eq!(normalize_virtual("/a/b/"), "a/b");
        assert_eq!(normalize_virtual("a//b///c"), "a/b/c");
    }

    #[test]
    fn test_first_party_candidates() {
        let c = config();
        let classified = classify(&c, "github.com/acme/app/pkg");
        assert_eq!(
            paths(candidates(&c, &classified)),
            vec![
                (RootKind::Workspace, PathBuf::from("/w/pkg")),
                (RootKind::GenfilesShadow, PathBuf::from("/w/bazel-genfiles/pkg")),
            ]
        );
    }

    #[test]
    fn test_vendor_candidates_interleave_shadow() {
        let c = config();
        let classified = classify(&c, "golang.org/x/net");
        assert_eq!(
            paths(candidates(&c, &classified)),
            vec![
                (RootKind::Vendor(0), PathBuf::from("/w/vendor/golang.org/x/net")),
                (
                    RootKind::GenfilesShadow,
                    PathBuf::from("/w/bazel-genfiles/vendor/golang.org/x/net")
                ),
                (
                    RootKind::Vendor(1),
                    PathBuf::from("/w/third_party/go/golang.org/x/net")
                ),
                (
                    RootKind::GenfilesShadow,
                    PathBuf::from("/w/bazel-genfiles/third_party/go/golang.org/x/net")
                ),
            ]
        );
    }

    #[test]
    fn test_pass_through_candidates() {
        let c = config();
        let classified = classify(&c, "tools/gen.txt");
        assert_eq!(
            paths(candidates(&c, &classified)),
            vec![(RootKind::PassThrough, PathBuf::from("/w/tools/gen.txt"))]
        );
    }

    #[test]
    fn test_synthesized_paths_have_no_candidates() {
        let c = config();
        assert_eq!(candidates(&c, &ClassifiedPath::Root).count(), 0);
        assert_eq!(candidates(&c, &ClassifiedPath::FirstPartyRoot).count(), 0);
    }

    #[test]
    fn test_sdk_overlay() {
        let c = config();

        let classified = classify(&c, "github.com/acme/app/GOROOT/src/fmt/print.go");
        assert_eq!(
            paths(file_candidates(&c, &classified)),
            vec![(RootKind::Sdk, PathBuf::from("/sdk/src/fmt/print.go"))]
        );

        let classified = classify(&c, "github.com/acme/app/GOROOT");
        assert_eq!(
            paths(file_candidates(&c, &classified)),
            vec![(RootKind::Sdk, PathBuf::from("/sdk"))]
        );

        // Only the exact segment triggers the overlay
        let classified = classify(&c, "github.com/acme/app/GOROOTS/x");
        assert_eq!(
            file_candidates(&c, &classified).next().unwrap().kind,
            RootKind::Workspace
        );

        // Listings never use the overlay
        let classified = classify(&c, "github.com/acme/app/GOROOT");
        assert_eq!(
            candidates(&c, &classified).next().unwrap().path,
            Path::new("/w/GOROOT")
        );
    }

    #[test]
    fn test_sdk_marker_inert_without_sdk_root() {
        let c = NamespaceConfig::new("src", "/w");
        let classified = classify(&c, "src/GOROOT/x");
        assert_eq!(
            file_candidates(&c, &classified).next().unwrap(),
            BackingLocation::new(RootKind::Workspace, "/w/GOROOT/x")
        );
    }

    #[test]
    fn test_candidates_are_lazy() {
        let c = config();
        let classified = classify(&c, "golang.org/x/net");
        let mut it = candidates(&c, &classified);
        assert_eq!(it.next().unwrap().kind, RootKind::Vendor(0));
        // Dropping the iterator here never builds the remaining candidates
    }
}
