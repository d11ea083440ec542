//! On-disk layout of build and applied state under the project home.

use std::path::{Path, PathBuf};

/// Resolves every path the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    home: PathBuf,
}

impl StateLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn build_dir(&self) -> PathBuf {
        self.home.join("build")
    }

    pub fn applied_dir(&self) -> PathBuf {
        self.home.join("aimdata").join("applied")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.home.join("Outputs")
    }

    /// `<home>/build/templates/<account>/<region>/<stem>.yaml`
    pub fn build_template(&self, account: &str, region: &str, stem: &str) -> PathBuf {
        self.build_dir()
            .join("templates")
            .join(account)
            .join(region)
            .join(format!("{stem}.yaml"))
    }

    pub fn cache_file(&self, account: &str, region: &str, stem: &str) -> PathBuf {
        self.build_template(account, region, stem)
            .with_extension("cache")
    }

    pub fn output_file(&self, account: &str, region: &str, stem: &str) -> PathBuf {
        self.build_template(account, region, stem)
            .with_extension("output")
    }

    /// `<home>/aimdata/applied/cloudformation/<account>/<region>/<stem>.yaml`
    pub fn applied_template(&self, account: &str, region: &str, stem: &str) -> PathBuf {
        self.applied_dir()
            .join("cloudformation")
            .join(account)
            .join(region)
            .join(format!("{stem}.yaml"))
    }

    pub fn applied_parameters(&self, account: &str, region: &str, stem: &str) -> PathBuf {
        self.applied_template(account, region, stem)
            .with_extension("parameters")
    }

    /// `<home>/Outputs/<key>.yaml`
    pub fn outputs_file(&self, key: &str) -> PathBuf {
        self.outputs_dir().join(format!("{key}.yaml"))
    }

    /// Applied copy of a project model file, keyed by its path relative to
    /// the home.
    pub fn applied_model(&self, relative: &Path) -> PathBuf {
        self.applied_dir().join("model").join(relative)
    }

    pub fn group_state(&self, file_name: &str) -> PathBuf {
        self.build_dir().join(file_name)
    }

    /// `path` relative to the home, for display.
    pub fn short<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.home).unwrap_or(path)
    }
}
