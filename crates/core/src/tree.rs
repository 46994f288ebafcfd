//! Source tree abstraction.
//!
//! The pipeline reads and writes units through [`SourceTree`] so it can run
//! against the real filesystem ([`DiskTree`]) or an in-memory map
//! ([`MemoryTree`]) in tests. Paths are always tree-relative with `/`
//! separators.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

pub trait SourceTree: Send + Sync {
    /// Every file in the tree, sorted, skipping pruned directories.
    fn walk(&self) -> io::Result<Vec<String>>;

    fn read(&self, path: &str) -> io::Result<String>;

    /// Replace the content of `path`. The parent directory must exist.
    fn write(&self, path: &str, contents: &str) -> io::Result<()>;

    fn remove(&self, path: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;

    fn create_dir_all(&self, dir: &str) -> io::Result<()>;

    /// Give `to` the permissions of `from`. Trees without a permission
    /// model have nothing to copy.
    fn copy_permissions(&self, _from: &str, _to: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Directories never descended into: VCS metadata, vendored code, test
/// fixtures and anything the Go tool itself ignores.
pub fn is_pruned_dir(name: &str) -> bool {
    matches!(name, "vendor" | "testdata") || name.starts_with('.') || name.starts_with('_')
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

// ── Disk ────────────────────────────────────────────────────────────────

/// Filesystem-backed tree rooted at a directory.
pub struct DiskTree {
    root: PathBuf,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            ));
        }
        Ok(DiskTree { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |p, c| p.join(c))
    }
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| !is_pruned_dir(name))
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

impl SourceTree for DiskTree {
    fn walk(&self) -> io::Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_entry(keep_entry) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            match relative(&self.root, entry.path()) {
                Some(rel) => files.push(rel),
                None => warn!(path = %entry.path().display(), "tree: skipping non UTF-8 path"),
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.abs(path))
    }

    /// Writes go to a temporary file in the same directory which is then
    /// renamed over the target, so a crash never leaves a torn file. An
    /// existing target keeps its permissions.
    fn write(&self, path: &str, contents: &str) -> io::Result<()> {
        let target = self.abs(path);
        let dir = target.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.abs(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.abs(path).is_file()
    }

    fn create_dir_all(&self, dir: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.abs(dir))
    }

    fn copy_permissions(&self, from: &str, to: &str) -> io::Result<()> {
        let permissions = std::fs::metadata(self.abs(from))?.permissions();
        std::fs::set_permissions(self.abs(to), permissions)
    }
}

// ── Memory ──────────────────────────────────────────────────────────────

/// In-memory tree for tests and dry simulations.
#[derive(Default)]
pub struct MemoryTree {
    files: Mutex<BTreeMap<String, String>>,
    dirs: Mutex<BTreeSet<String>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let tree = Self::new();
        for (path, contents) in files {
            tree.insert(path, contents);
        }
        tree
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.lock_files().insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.lock_files().get(path).cloned()
    }

    /// Snapshot of every file.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.lock_files().clone()
    }

    pub fn has_dir(&self, dir: &str) -> bool {
        self.dirs.lock().map(|d| d.contains(dir)).unwrap_or(false)
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a consistent map: every mutation is a
        // single insert or remove.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SourceTree for MemoryTree {
    fn walk(&self) -> io::Result<Vec<String>> {
        Ok(self
            .lock_files()
            .keys()
            .filter(|path| {
                let mut dirs: Vec<&str> = path.split('/').collect();
                dirs.pop();
                !dirs.iter().any(|d| is_pruned_dir(d))
            })
            .cloned()
            .collect())
    }

    fn read(&self, path: &str) -> io::Result<String> {
        self.get(path).ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &str, contents: &str) -> io::Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.lock_files()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.lock_files().contains_key(path)
    }

    fn create_dir_all(&self, dir: &str) -> io::Result<()> {
        if let Ok(mut dirs) = self.dirs.lock() {
            dirs.insert(dir.to_string());
        }
        Ok(())
    }
}
