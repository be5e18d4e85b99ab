//! In-memory backing store.
//!
//! Used for router tests and dry runs. All data is ephemeral. Paths are
//! absolute, like the native backend's, and behave the same way: creating a
//! file needs an existing parent, `make_dir_all` creates parents, `rename`
//! creates the destination's parent.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::BackingStore;
use crate::vfs::types::{DirEntry, FileAttr, FileType, OpenFlags};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn kind(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Directory { .. } => FileType::Directory,
        }
    }
}

/// In-memory backing store.
///
/// Thread-safe via internal `RwLock`s. Paths can be write-protected with
/// [`MemoryBackend::protect`] to exercise permission handling, and every
/// `stat` is recorded so callers can check lookup order.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    protected: RwLock<HashSet<PathBuf>>,
    stat_calls: RwLock<Vec<PathBuf>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new store containing only `/`.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            PathBuf::from("/"),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
            protected: RwLock::new(HashSet::new()),
            stat_calls: RwLock::new(Vec::new()),
        }
    }

    /// Seed a file (and its parent directories) with `data`.
    pub fn add_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        let normalized = Self::normalize(path.as_ref());
        let data = data.into();
        let mut entries = self.write_entries()?;
        Self::ensure_parents(&mut entries, &normalized);
        let attr = FileAttr::file(data.len() as u64, 0o644);
        entries.insert(normalized, Entry::File { data, attr });
        Ok(())
    }

    /// Seed a directory (and its parents).
    pub fn add_dir(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let normalized = Self::normalize(path.as_ref());
        let mut entries = self.write_entries()?;
        Self::ensure_parents(&mut entries, &normalized);
        entries.entry(normalized).or_insert(Entry::Directory {
            attr: FileAttr::directory(0o755),
        });
        Ok(())
    }

    /// Mark a path as not writable.
    pub fn protect(&self, path: impl AsRef<Path>) {
        if let Ok(mut protected) = self.protected.write() {
            protected.insert(Self::normalize(path.as_ref()));
        }
    }

    /// Paths passed to `stat`, oldest first.
    pub fn stat_calls(&self) -> Vec<PathBuf> {
        self.stat_calls.read().map(|p| p.clone()).unwrap_or_default()
    }

    /// Forget recorded stat calls.
    pub fn clear_stat_calls(&self) {
        if let Ok(mut calls) = self.stat_calls.write() {
            calls.clear();
        }
    }

    /// Normalize to an absolute path with `.` and `..` resolved.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::from("/");
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn write_entries(
        &self,
    ) -> VfsResult<std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    fn read_entries(&self) -> VfsResult<std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    /// Ensure all parent directories exist.
    fn ensure_parents(entries: &mut HashMap<PathBuf, Entry>, path: &Path) {
        let mut current = PathBuf::from("/");
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                entries.entry(current.clone()).or_insert(Entry::Directory {
                    attr: FileAttr::directory(0o755),
                });
            }
        }
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected
            .read()
            .map(|p| p.contains(path))
            .unwrap_or(false)
    }

    fn check_mutable(&self, path: &Path) -> VfsResult<()> {
        if self.is_protected(path) {
            Err(VfsError::permission_denied(Self::path_str(path)))
        } else {
            Ok(())
        }
    }

    fn require_parent_dir(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = path.parent().unwrap_or(Path::new("/"));
        match entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(VfsError::not_a_directory(Self::path_str(parent))),
            None => Err(VfsError::not_found(Self::path_str(parent))),
        }
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }
}

#[async_trait]
impl BackingStore for MemoryBackend {
    async fn list(&self, dir: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(dir);
        let entries = self.read_entries()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(normalized.as_path()))
            .filter_map(|(path, entry)| {
                path.file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), entry.kind()))
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn stat(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        if let Ok(mut calls) = self.stat_calls.write() {
            calls.push(normalized.clone());
        }

        let entries = self.read_entries()?;
        entries
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        if flags.wants_write() {
            self.check_mutable(&normalized)?;
        }

        let mut entries = self.write_entries()?;
        match entries.get_mut(&normalized) {
            Some(Entry::File { data, attr }) => {
                if flags.truncate {
                    data.clear();
                    attr.size = 0;
                    attr.mtime = SystemTime::now();
                }
                Ok(attr.clone())
            }
            Some(Entry::Directory { attr }) if !flags.wants_write() => Ok(attr.clone()),
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        let entries = self.read_entries()?;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = (start + size as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn check_writable(&self, path: &Path) -> bool {
        !self.is_protected(&Self::normalize(path))
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let normalized = Self::normalize(path);
        self.check_mutable(&normalized)?;

        let mut entries = self.write_entries()?;
        match entries.get_mut(&normalized) {
            Some(Entry::File {
                data: file_data,
                attr,
            }) => {
                let offset = offset as usize;
                // Extend if necessary
                if offset + data.len() > file_data.len() {
                    file_data.resize(offset + data.len(), 0);
                }
                file_data[offset..offset + data.len()].copy_from_slice(data);
                attr.size = file_data.len() as u64;
                attr.mtime = SystemTime::now();
                Ok(data.len() as u32)
            }
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn create_file(&self, path: &Path, mode: u32, exclusive: bool) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        self.check_mutable(&normalized)?;

        // Check and insert under one guard so exclusive creates cannot race
        let mut entries = self.write_entries()?;
        Self::require_parent_dir(&entries, &normalized)?;

        match entries.get(&normalized) {
            Some(_) if exclusive => {
                return Err(VfsError::already_exists(Self::path_str(&normalized)));
            }
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            _ => {}
        }

        let attr = FileAttr::file(0, mode);
        entries.insert(
            normalized,
            Entry::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    async fn remove_file(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        self.check_mutable(&normalized)?;

        let mut entries = self.write_entries()?;
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }

    async fn make_dir_all(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        self.check_mutable(&normalized)?;

        let mut entries = self.write_entries()?;
        let mut current = PathBuf::from("/");
        for component in normalized.components() {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(Entry::File { .. }) => {
                        return Err(VfsError::already_exists(Self::path_str(&current)));
                    }
                    None => {
                        entries.insert(
                            current.clone(),
                            Entry::Directory {
                                attr: FileAttr::directory(mode),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        self.check_mutable(&normalized)?;

        let mut entries = self.write_entries()?;
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(VfsError::not_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        entries.retain(|k, _| !k.starts_with(&normalized));
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_normalized = Self::normalize(from);
        let to_normalized = Self::normalize(to);
        self.check_mutable(&from_normalized)?;

        let mut entries = self.write_entries()?;
        if !entries.contains_key(&from_normalized) {
            return Err(VfsError::not_found(Self::path_str(&from_normalized)));
        }

        // Ensure parent of destination exists
        Self::ensure_parents(&mut entries, &to_normalized);

        // Move the entry and, for directories, everything below it
        let moved: Vec<_> = entries
            .keys()
            .filter(|k| k.starts_with(&from_normalized))
            .cloned()
            .collect();

        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let target = match old.strip_prefix(&from_normalized) {
                    Ok(relative) if !relative.as_os_str().is_empty() => to_normalized.join(relative),
                    _ => to_normalized.clone(),
                };
                entries.insert(target, entry);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_and_list() {
        let fs = MemoryBackend::new();
        fs.add_file("/w/pkg/main.go", "package main").unwrap();
        fs.add_dir("/w/vendor").unwrap();

        let entries = fs.list(Path::new("/w")).await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::directory("pkg"), DirEntry::directory("vendor")]
        );

        let data = fs.read(Path::new("/w/pkg/main.go"), 0, 100).await.unwrap();
        assert_eq!(data, b"package main");
    }

    #[tokio::test]
    async fn test_create_needs_parent() {
        let fs = MemoryBackend::new();
        let result = fs.create_file(Path::new("/missing/file.txt"), 0o644, false).await;
        assert!(result.unwrap_err().is_not_found());

        fs.make_dir_all(Path::new("/a/b"), 0o755).await.unwrap();
        let attr = fs.create_file(Path::new("/a/b/file.txt"), 0o600, false).await.unwrap();
        assert_eq!(attr.perm, 0o600);
    }

    #[tokio::test]
    async fn test_exclusive_create() {
        let fs = MemoryBackend::new();
        fs.add_file("/lock", "owner").unwrap();

        let err = fs.create_file(Path::new("/lock"), 0o644, true).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
        assert_eq!(fs.read(Path::new("/lock"), 0, 16).await.unwrap(), b"owner");

        // Without the flag the file is truncated
        let attr = fs.create_file(Path::new("/lock"), 0o644, false).await.unwrap();
        assert_eq!(attr.size, 0);
    }

    #[tokio::test]
    async fn test_write_extends() {
        let fs = MemoryBackend::new();
        fs.add_file("/f", "").unwrap();
        fs.write(Path::new("/f"), 0, b"hello").await.unwrap();
        fs.write(Path::new("/f"), 5, b" world").await.unwrap();
        assert_eq!(fs.read(Path::new("/f"), 0, 100).await.unwrap(), b"hello world");
        assert_eq!(fs.stat(Path::new("/f")).await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_protected_paths() {
        let fs = MemoryBackend::new();
        fs.add_file("/ro.txt", "x").unwrap();
        fs.protect("/ro.txt");

        assert!(!fs.check_writable(Path::new("/ro.txt")).await);
        assert!(fs.open(Path::new("/ro.txt"), OpenFlags::read()).await.is_ok());
        assert!(matches!(
            fs.open(Path::new("/ro.txt"), OpenFlags::write()).await,
            Err(VfsError::PermissionDenied(_))
        ));
        assert!(fs.remove_file(Path::new("/ro.txt")).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_dir_all() {
        let fs = MemoryBackend::new();
        fs.add_file("/w/a/b/c.txt", "").unwrap();
        fs.add_file("/w/ab.txt", "").unwrap();

        fs.remove_dir_all(Path::new("/w/a")).await.unwrap();
        assert!(!fs.exists(Path::new("/w/a/b/c.txt")).await);
        assert!(fs.exists(Path::new("/w/ab.txt")).await);

        let again = fs.remove_dir_all(Path::new("/w/a")).await;
        assert!(again.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rename_directory() {
        let fs = MemoryBackend::new();
        fs.add_file("/w/old/x.txt", "x").unwrap();

        fs.rename(Path::new("/w/old"), Path::new("/w/new/inner"))
            .await
            .unwrap();

        assert!(!fs.exists(Path::new("/w/old")).await);
        assert!(fs.exists(Path::new("/w/new/inner/x.txt")).await);
    }

    #[tokio::test]
    async fn test_stat_calls_recorded() {
        let fs = MemoryBackend::new();
        let _ = fs.stat(Path::new("/a")).await;
        let _ = fs.stat(Path::new("/b/../c")).await;
        assert_eq!(fs.stat_calls(), vec![PathBuf::from("/a"), PathBuf::from("/c")]);
        fs.clear_stat_calls();
        assert!(fs.stat_calls().is_empty());
    }
}
