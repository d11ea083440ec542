//! Local filesystem adapter using std::fs.

use std::io;
use std::path::Path;

use strata_core::{application::ports::Filesystem, error::StrataResult};

/// Production filesystem implementation using `std::fs`.
#[derive(Debug, Clone, Copy)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    /// Create a new local filesystem adapter.
    pub fn new() -> Self {
        Self
    }

    fn ensure_parent(path: &Path) -> StrataResult<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
                .map_err(|e| map_io_error(parent, e, "create directory")),
            _ => Ok(()),
        }
    }
}

impl Default for LocalFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for LocalFilesystem {
    fn read_to_string(&self, path: &Path) -> StrataResult<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error(path, e, "read file")),
        }
    }

    fn write_file(&self, path: &Path, content: &str) -> StrataResult<()> {
        Self::ensure_parent(path)?;
        // Write beside the target, then rename over it
        let tmp = path.with_extension("strata-tmp");
        std::fs::write(&tmp, content).map_err(|e| map_io_error(&tmp, e, "write file"))?;
        std::fs::rename(&tmp, path).map_err(|e| map_io_error(path, e, "replace file"))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_file(&self, path: &Path) -> StrataResult<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io_error(path, e, "remove file")),
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> StrataResult<()> {
        Self::ensure_parent(to)?;
        std::fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| map_io_error(from, e, "copy file"))
    }

    fn create_dir_all(&self, path: &Path) -> StrataResult<()> {
        std::fs::create_dir_all(path).map_err(|e| map_io_error(path, e, "create directory"))
    }
}

fn map_io_error(path: &Path, e: io::Error, operation: &str) -> strata_core::error::StrataError {
    use strata_core::application::ApplicationError;

    ApplicationError::FilesystemError {
        path: path.to_path_buf(),
        reason: format!("Failed to {}: {}", operation, e),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let path = dir.path().join("build/templates/dev/us-west-2/s.yaml");

        fs.write_file(&path, "Resources: {}\n").unwrap();

        assert!(fs.exists(&path));
        assert_eq!(
            fs.read_to_string(&path).unwrap().as_deref(),
            Some("Resources: {}\n")
        );
        assert!(!path.with_extension("strata-tmp").exists());
    }

    #[test]
    fn missing_file_reads_as_none_and_removes_as_false() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let path = dir.path().join("absent.cache");

        assert_eq!(fs.read_to_string(&path).unwrap(), None);
        assert!(!fs.remove_file(&path).unwrap());
    }

    #[test]
    fn copy_creates_destination_directories() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let from = dir.path().join("a.yaml");
        let to = dir.path().join("aimdata/applied/a.yaml");
        fs.write_file(&from, "x: 1\n").unwrap();

        fs.copy_file(&from, &to).unwrap();

        assert_eq!(fs.read_to_string(&to).unwrap().as_deref(), Some("x: 1\n"));
        assert!(fs.remove_file(&from).unwrap());
    }
}
