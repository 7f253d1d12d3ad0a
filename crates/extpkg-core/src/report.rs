//! Configuration report: what was found, what was built, what failed.

use std::fmt;
use std::path::{Path, PathBuf};

use extpkg_schema::{BuildConfig, PackageName};
use serde::Serialize;

use crate::error::ConfigureError;
use crate::graph::{DependencyGraph, Resolution};

/// Outcome of one package, as written to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    /// An existing installation was used.
    Found,
    /// Built from source into the prefix.
    Installed,
    /// Provided by the no-op parallel runtime stub.
    Stub,
    /// Resolution failed; see `error`.
    Failed,
}

/// One configured (or failed) package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageReport {
    /// Registry name.
    pub name: PackageName,
    /// Upper-case key used by build systems consuming the report (`HDF5`).
    pub key: String,
    /// How the package was resolved.
    pub status: PackageStatus,
    /// Installation root, when known.
    pub directory: Option<PathBuf>,
    /// Include directories to compile against.
    pub include_dirs: Vec<PathBuf>,
    /// Library files to link.
    pub libraries: Vec<PathBuf>,
    /// Error category and message when `status` is `failed`.
    pub error: Option<FailureReport>,
}

/// A failure as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// Short category, e.g. `constraint violation`.
    pub kind: String,
    /// Full error message.
    pub message: String,
}

impl From<&ConfigureError> for FailureReport {
    fn from(err: &ConfigureError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Shared install prefix.
    pub prefix: PathBuf,
    /// Build configuration the run used.
    pub config: BuildConfig,
    /// Dependencies before dependents; skipped packages are left out.
    pub packages: Vec<PackageReport>,
    /// A failure not attributable to one package.
    pub error: Option<FailureReport>,
}

impl Report {
    /// Build the report for `graph`, attaching `failure` to the package it
    /// names (or to the run as a whole).
    pub fn new(graph: &DependencyGraph<'_>, failure: Option<&ConfigureError>) -> Self {
        let packages = graph
            .resolved()
            .filter_map(|resolved| {
                let (status, loc) = match &resolved.resolution {
                    Resolution::Found(loc) => (PackageStatus::Found, Some(loc)),
                    Resolution::Installed(loc) => (PackageStatus::Installed, Some(loc)),
                    Resolution::Stub => (PackageStatus::Stub, None),
                    Resolution::Skipped => return None,
                };
                Some(PackageReport {
                    name: resolved.name.clone(),
                    key: resolved.name.config_key(),
                    status,
                    directory: loc.and_then(|l| l.directory.clone()),
                    include_dirs: loc.map(|l| l.include_dirs.clone()).unwrap_or_default(),
                    libraries: loc.map(|l| l.libraries.clone()).unwrap_or_default(),
                    error: None,
                })
            })
            .collect();

        let mut report = Self {
            prefix: graph.layout().prefix().to_path_buf(),
            config: graph.config().clone(),
            packages,
            error: None,
        };
        if let Some(err) = failure {
            report.attach(err);
        }
        report
    }

    /// Report of a run that failed before any package was resolved (bad
    /// options, unreadable registry, unknown package).
    pub fn failed(prefix: &Path, config: &BuildConfig, err: &ConfigureError) -> Self {
        let mut report = Self {
            prefix: prefix.to_path_buf(),
            config: config.clone(),
            packages: Vec::new(),
            error: None,
        };
        report.attach(err);
        report
    }

    fn attach(&mut self, err: &ConfigureError) {
        match err.package() {
            Some(name) => self.packages.push(PackageReport {
                name: name.clone(),
                key: name.config_key(),
                status: PackageStatus::Failed,
                directory: None,
                include_dirs: Vec::new(),
                libraries: Vec::new(),
                error: Some(err.into()),
            }),
            None => self.error = Some(err.into()),
        }
    }

    /// Whether every requested package was resolved.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .packages
                .iter()
                .all(|p| p.status != PackageStatus::Failed)
    }

    /// Pretty-printed JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn list(paths: &[PathBuf]) -> String {
    let items: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("[{}]", items.join(", "))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = &self.config;
        writeln!(
            f,
            "Precision: {}  Scalar type: {}  Prefix: {}",
            config.precision,
            config.scalar,
            self.prefix.display()
        )?;
        for pkg in &self.packages {
            match (&pkg.status, &pkg.error) {
                (PackageStatus::Failed, Some(err)) => {
                    writeln!(f, "{} ({}):", pkg.name, err.kind)?;
                    for line in err.message.lines() {
                        writeln!(f, "  {line}")?;
                    }
                }
                (PackageStatus::Stub, _) => writeln!(f, "{} (stub)", pkg.name)?,
                (status, _) => {
                    let how = if *status == PackageStatus::Installed {
                        " (installed)"
                    } else {
                        ""
                    };
                    writeln!(f, "{}{how}:", pkg.name)?;
                    writeln!(f, "  Includes: {}", list(&pkg.include_dirs))?;
                    writeln!(f, "  Library: {}", list(&pkg.libraries))?;
                }
            }
        }
        if let Some(err) = &self.error {
            writeln!(f, "error ({}): {}", err.kind, err.message)?;
        }
        Ok(())
    }
}
