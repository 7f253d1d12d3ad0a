//! Paths under the shared install prefix.

use std::path::{Path, PathBuf};

/// On-disk layout under the shared install prefix.
///
/// ```text
/// <prefix>/
/// ├── include/            # headers installed by every package
/// ├── lib/                # libraries installed by every package
/// ├── externalpackages/   # acquired source trees, one per package
/// └── logs/               # per-step build logs
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    prefix: PathBuf,
}

impl Layout {
    /// Layout rooted at `prefix`.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The shared install prefix.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// `<prefix>/lib`
    pub fn lib_dir(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    /// `<prefix>/externalpackages`
    pub fn packages_dir(&self) -> PathBuf {
        self.prefix.join("externalpackages")
    }

    /// Source tree location for one package.
    pub fn source_dir(&self, package: &str) -> PathBuf {
        self.packages_dir().join(package)
    }

    /// `<prefix>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.prefix.join("logs")
    }

    /// `<prefix>/extpkg-report.json`, rewritten by every configure run.
    pub fn report_path(&self) -> PathBuf {
        self.prefix.join("extpkg-report.json")
    }

    /// Generate a build log path for one step of a package.
    pub fn build_log_path(&self, package: &str, step: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir()
            .join(format!("{package}-{step}-{timestamp}.log"))
    }
}
