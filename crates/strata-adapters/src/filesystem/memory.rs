//! In-memory filesystem adapter for testing.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use strata_core::{
    application::{ApplicationError, ports::Filesystem},
    error::StrataResult,
};

/// In-memory filesystem for testing.
///
/// Clones share the same contents, so a test can keep a handle while the
/// engine owns another.
#[derive(Debug, Clone)]
pub struct MemoryFilesystem {
    inner: Arc<RwLock<MemoryFilesystemInner>>,
}

#[derive(Debug, Default)]
struct MemoryFilesystemInner {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
}

impl MemoryFilesystemInner {
    /// Record `dir` and every ancestor of it as a directory.
    fn mark_dirs(&mut self, dir: &Path) {
        self.directories
            .extend(dir.ancestors().filter(|a| !a.as_os_str().is_empty()).map(Path::to_path_buf));
    }

    fn mark_parents(&mut self, file: &Path) {
        if let Some(parent) = file.parent() {
            self.mark_dirs(parent);
        }
    }
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self {
            inner: Arc::default(),
        }
    }

    /// Read a file's content (testing helper).
    pub fn read_file(&self, path: &Path) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner.files.get(path).cloned()
    }

    /// List all files, sorted.
    pub fn list_files(&self) -> Vec<PathBuf> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = inner.files.keys().cloned().collect();
        files.sort();
        files
    }

    /// Forget every file and directory.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = MemoryFilesystemInner::default();
        }
    }

    fn lock(&self) -> StrataResult<RwLockReadGuard<'_, MemoryFilesystemInner>> {
        Ok(self.inner.read().map_err(|_| ApplicationError::StoreLockError)?)
    }

    fn lock_mut(&self) -> StrataResult<RwLockWriteGuard<'_, MemoryFilesystemInner>> {
        Ok(self.inner.write().map_err(|_| ApplicationError::StoreLockError)?)
    }
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for MemoryFilesystem {
    fn read_to_string(&self, path: &Path) -> StrataResult<Option<String>> {
        let inner = self.lock()?;
        Ok(inner.files.get(path).cloned())
    }

    fn write_file(&self, path: &Path, content: &str) -> StrataResult<()> {
        let mut inner = self.lock_mut()?;

        if inner.directories.contains(path) {
            return Err(ApplicationError::FilesystemError {
                path: path.to_path_buf(),
                reason: "Path is a directory".into(),
            }
            .into());
        }
        inner.mark_parents(path);
        inner.files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner
            .read()
            .map(|inner| inner.files.contains_key(path) || inner.directories.contains(path))
            .unwrap_or(false)
    }

    fn remove_file(&self, path: &Path) -> StrataResult<bool> {
        let mut inner = self.lock_mut()?;
        Ok(inner.files.remove(path).is_some())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> StrataResult<()> {
        let mut inner = self.lock_mut()?;
        let content = inner
            .files
            .get(from)
            .cloned()
            .ok_or_else(|| ApplicationError::FilesystemError {
                path: from.to_path_buf(),
                reason: "Failed to copy file: not found".into(),
            })?;
        inner.mark_parents(to);
        inner.files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> StrataResult<()> {
        let mut inner = self.lock_mut()?;

        inner.mark_dirs(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let fs = MemoryFilesystem::new();
        let handle = fs.clone();
        fs.write_file(Path::new("/p/build/a.yaml"), "a").unwrap();

        assert_eq!(handle.read_file(Path::new("/p/build/a.yaml")).as_deref(), Some("a"));
        assert!(handle.exists(Path::new("/p/build")));
    }

    #[test]
    fn copy_of_missing_file_fails() {
        let fs = MemoryFilesystem::new();
        let err = fs
            .copy_file(Path::new("/p/none"), Path::new("/p/other"))
            .unwrap_err();
        assert!(err.to_string().contains("/p/none"));
    }

    #[test]
    fn remove_reports_whether_the_file_existed() {
        let fs = MemoryFilesystem::new();
        fs.write_file(Path::new("/x"), "1").unwrap();
        assert!(fs.remove_file(Path::new("/x")).unwrap());
        assert!(!fs.remove_file(Path::new("/x")).unwrap());
        assert!(fs.list_files().is_empty());
    }
}
