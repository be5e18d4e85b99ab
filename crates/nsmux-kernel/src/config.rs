//! Namespace configuration.
//!
//! [`NamespaceConfig`] is built once at startup (usually from a TOML file via
//! [`NamespaceConfig::load`]) and shared read-only behind an `Arc` by every
//! router for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the generated-output shadow directory.
pub const DEFAULT_GENFILES_DIR: &str = "bazel-genfiles";

/// Default first-party segment that redirects file lookups into the SDK root.
pub const DEFAULT_SDK_MARKER: &str = "GOROOT";

/// Config file name looked up under the user's config directory.
pub const CONFIG_FILE_NAME: &str = "nsmux.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// On-disk configuration, as written by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Segment under which the workspace is exposed (e.g. an import path).
    pub prefix: String,

    /// Workspace root; `~` is expanded.
    pub workspace: String,

    /// SDK root reachable through the SDK marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,

    /// Generated-output shadow directory name under the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genfiles: Option<String>,

    /// Vendor roots relative to the workspace, highest priority first.
    #[serde(default)]
    pub vendors: Vec<String>,

    /// Virtual prefixes routed verbatim to the workspace.
    #[serde(default)]
    pub pass_through: Vec<String>,

    /// Names hidden from the first-party root listing.
    #[serde(default)]
    pub ignored: Vec<String>,

    /// Extra names kept out of merged listings.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Override for the SDK marker segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_marker: Option<String>,
}

/// Immutable namespace configuration.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    first_party_prefix: String,
    workspace_root: PathBuf,
    sdk_root: Option<PathBuf>,
    sdk_marker: String,
    genfiles_dir_name: String,
    vendor_roots: Vec<String>,
    pass_through_paths: Vec<String>,
    pass_through_set: HashSet<String>,
    ignored_names: HashSet<String>,
}

impl NamespaceConfig {
    /// Create a config with no vendors, no pass-through paths and no SDK.
    pub fn new(first_party_prefix: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            first_party_prefix: trim_slashes(&first_party_prefix.into()),
            workspace_root: workspace_root.into(),
            sdk_root: None,
            sdk_marker: DEFAULT_SDK_MARKER.to_string(),
            genfiles_dir_name: DEFAULT_GENFILES_DIR.to_string(),
            vendor_roots: Vec::new(),
            pass_through_paths: Vec::new(),
            pass_through_set: HashSet::new(),
            ignored_names: HashSet::new(),
        }
    }

    /// Set the SDK root.
    pub fn with_sdk_root(mut self, sdk_root: impl Into<PathBuf>) -> Self {
        self.sdk_root = Some(sdk_root.into());
        self
    }

    /// Set the SDK marker segment.
    pub fn with_sdk_marker(mut self, marker: impl Into<String>) -> Self {
        self.sdk_marker = trim_slashes(&marker.into());
        self
    }

    /// Set the genfiles shadow directory name.
    pub fn with_genfiles_dir(mut self, name: impl Into<String>) -> Self {
        self.genfiles_dir_name = trim_slashes(&name.into());
        self
    }

    /// Set the vendor roots, highest priority first.
    pub fn with_vendors<I, S>(mut self, vendors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vendor_roots = vendors
            .into_iter()
            .map(|v| trim_slashes(&v.into()))
            .filter(|v| !v.is_empty())
            .collect();
        self
    }

    /// Set the pass-through paths.
    ///
    /// The final segment of each one is added to the exclusion set so merged
    /// listings never shadow the pass-through entry.
    pub fn with_pass_through<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pass_through_paths = paths
            .into_iter()
            .map(|p| trim_slashes(&p.into()))
            .filter(|p| !p.is_empty())
            .collect();
        for path in &self.pass_through_paths {
            self.pass_through_set.insert(final_segment(path).to_string());
        }
        self
    }

    /// Add names to the exclusion set.
    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pass_through_set.extend(names.into_iter().map(Into::into));
        self
    }

    /// Set the names hidden from the first-party root listing.
    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn first_party_prefix(&self) -> &str {
        &self.first_party_prefix
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn sdk_root(&self) -> Option<&Path> {
        self.sdk_root.as_deref()
    }

    pub fn sdk_marker(&self) -> &str {
        &self.sdk_marker
    }

    pub fn genfiles_dir_name(&self) -> &str {
        &self.genfiles_dir_name
    }

    pub fn vendor_roots(&self) -> &[String] {
        &self.vendor_roots
    }

    pub fn pass_through_paths(&self) -> &[String] {
        &self.pass_through_paths
    }

    pub fn pass_through_set(&self) -> &HashSet<String> {
        &self.pass_through_set
    }

    pub fn ignored_names(&self) -> &HashSet<String> {
        &self.ignored_names
    }

    /// Absolute path of the genfiles shadow tree.
    pub fn genfiles_root(&self) -> PathBuf {
        self.workspace_root.join(&self.genfiles_dir_name)
    }

    /// True if `name` is excluded from workspace/vendor/genfiles listings.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.pass_through_set.contains(name)
    }

    /// True if a top-level workspace entry belongs to a vendor root.
    ///
    /// Matches a vendor entry itself or the first segment of a nested one
    /// (`third_party` for `third_party/go`).
    pub fn is_vendor_dir(&self, name: &str) -> bool {
        self.vendor_roots
            .iter()
            .any(|v| v == name || v.split('/').next() == Some(name))
    }

    /// Check the configuration preconditions.
    ///
    /// Run once at load time; the routers assume a valid config and never
    /// re-check these per request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_party_prefix.is_empty() {
            return Err(ConfigError::Invalid("prefix must not be empty".into()));
        }
        if self.genfiles_dir_name.is_empty() || self.genfiles_dir_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "genfiles must be a single path segment, got {:?}",
                self.genfiles_dir_name
            )));
        }
        if self.sdk_marker.is_empty() || self.sdk_marker.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "sdk_marker must be a single path segment, got {:?}",
                self.sdk_marker
            )));
        }
        if !self.workspace_root.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "workspace must be absolute, got {}",
                self.workspace_root.display()
            )));
        }
        for vendor in &self.vendor_roots {
            if vendor.starts_with('/') || vendor.split('/').any(|s| s == "..") {
                return Err(ConfigError::Invalid(format!(
                    "vendor {vendor:?} must be relative to the workspace"
                )));
            }
            if *vendor == self.first_party_prefix || *vendor == self.genfiles_dir_name {
                return Err(ConfigError::Invalid(format!(
                    "vendor {vendor:?} collides with the prefix or genfiles directory"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        Self::from_file(file)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build from an already-parsed [`ConfigFile`].
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let workspace = expand_path(&file.workspace);
        // Resolve symlinked roots (e.g. macOS /tmp) when the directory exists
        let workspace = dunce::canonicalize(&workspace).unwrap_or(workspace);

        let mut config = NamespaceConfig::new(file.prefix, workspace)
            .with_vendors(file.vendors)
            .with_pass_through(file.pass_through)
            .with_excluded(file.exclude)
            .with_ignored(file.ignored);

        if let Some(sdk) = file.sdk {
            config = config.with_sdk_root(expand_path(&sdk));
        }
        if let Some(genfiles) = file.genfiles {
            config = config.with_genfiles_dir(genfiles);
        }
        if let Some(marker) = file.sdk_marker {
            config = config.with_sdk_marker(marker);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Default config location: `$XDG_CONFIG_HOME/nsmux/nsmux.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nsmux").join(CONFIG_FILE_NAME))
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

fn trim_slashes(s: &str) -> String {
    s.trim_matches('/').to_string()
}

fn final_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        prefix = "github.com/acme/app"
        workspace = "/w"
        sdk = "/usr/local/go"
        vendors = ["vendor", "third_party/go/"]
        pass_through = ["tools", "build/defs"]
        ignored = ["bazel-bin"]
        exclude = ["extra"]
    "#;

    #[test]
    fn test_parse_full() {
        let config = NamespaceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.first_party_prefix(), "github.com/acme/app");
        assert_eq!(config.workspace_root(), Path::new("/w"));
        assert_eq!(config.sdk_root(), Some(Path::new("/usr/local/go")));
        assert_eq!(config.genfiles_dir_name(), DEFAULT_GENFILES_DIR);
        assert_eq!(config.sdk_marker(), DEFAULT_SDK_MARKER);
        assert_eq!(config.vendor_roots(), ["vendor", "third_party/go"]);
        assert_eq!(config.pass_through_paths(), ["tools", "build/defs"]);
        assert!(config.ignored_names().contains("bazel-bin"));
    }

    #[test]
    fn test_pass_through_set_uses_final_segment() {
        let config = NamespaceConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.is_excluded("tools"));
        assert!(config.is_excluded("defs"));
        assert!(config.is_excluded("extra"));
        assert!(!config.is_excluded("build"));
    }

    #[test]
    fn test_vendor_dir_detection() {
        let config = NamespaceConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.is_vendor_dir("vendor"));
        assert!(config.is_vendor_dir("third_party"));
        assert!(!config.is_vendor_dir("go"));
        assert!(!config.is_vendor_dir("pkg"));
    }

    #[test]
    fn test_defaults() {
        let config = NamespaceConfig::from_toml_str(
            r#"
            prefix = "src"
            workspace = "/w"
            "#,
        )
        .unwrap();
        assert!(config.vendor_roots().is_empty());
        assert!(config.sdk_root().is_none());
        assert_eq!(config.genfiles_root(), PathBuf::from("/w/bazel-genfiles"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = NamespaceConfig::from_toml_str(
            r#"
            prefix = "src"
            workspace = "/w"
            vendor = ["typo"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation() {
        let base = || NamespaceConfig::new("src", "/w");
        assert!(base().validate().is_ok());

        assert!(NamespaceConfig::new("", "/w").validate().is_err());
        assert!(NamespaceConfig::new("src", "relative").validate().is_err());
        assert!(base().with_vendors(["src"]).validate().is_err());
        assert!(base().with_vendors(["bazel-genfiles"]).validate().is_err());
        assert!(base().with_vendors(["../escape"]).validate().is_err());
        assert!(base().with_genfiles_dir("a/b").validate().is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let config = NamespaceConfig::from_toml_str(
            r#"
            prefix = "src"
            workspace = "/w"
            sdk = "~/sdk"
            "#,
        )
        .unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.sdk_root().unwrap(), home.join("sdk"));
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = NamespaceConfig::load("/definitely/not/here/nsmux.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
