//! Fatal configuration errors.
//!
//! Every variant ends the configuration run. Nothing here is downgraded to a
//! warning: a half-configured dependency graph would feed wrong paths into
//! every dependent's configure step.

use std::path::PathBuf;

use extpkg_schema::{DescriptorError, PackageName};
use thiserror::Error;

use crate::constraints::ConstraintViolation;
use crate::fetch::FetchAttempt;
use crate::pipeline::Step;
use crate::probe::ProbeMiss;

/// Result alias used throughout the core.
pub type Result<T, E = ConfigureError> = std::result::Result<T, E>;

/// Why a configuration run stopped.
#[derive(Error, Debug)]
pub enum ConfigureError {
    /// The package cannot be used under the active build configuration.
    #[error("Cannot use {package}: {violation}")]
    ConstraintViolation {
        /// Package whose capabilities do not allow the configuration.
        package: PackageName,
        /// The first violated constraint.
        violation: ConstraintViolation,
    },

    /// Every declared source location failed.
    #[error("Could not obtain {package}; attempted: {}", describe_attempts(.attempts))]
    AcquisitionFailure {
        /// Package being downloaded.
        package: PackageName,
        /// Each location tried, in order, with the reason it failed.
        attempts: Vec<FetchAttempt>,
    },

    /// A bootstrap tool is not on `PATH`.
    #[error("Could not bootstrap {package}: required tool '{tool}' not found")]
    ToolingMissing {
        /// Package being bootstrapped.
        package: PackageName,
        /// The missing executable.
        tool: String,
    },

    /// An external build step exited unsuccessfully.
    #[error("{step} step for {package} failed (exit code {}):\n{output}", describe_code(.code))]
    BuildFailure {
        /// Package being built.
        package: PackageName,
        /// Step that failed.
        step: Step,
        /// Exit code; `None` when killed by a signal.
        code: Option<i32>,
        /// Tail of the step's output.
        output: String,
        /// Full log of the step, when it was written to a file.
        log: Option<PathBuf>,
    },

    /// The install steps succeeded but the result does not pass the probes.
    #[error("{package} reported a successful install but is unusable: {miss}")]
    VerificationFailure {
        /// Package that was installed.
        package: PackageName,
        /// What the probes could not find.
        miss: ProbeMiss,
    },

    /// A package (transitively) depends on itself.
    #[error("Circular dependency detected: {}", describe_chain(.chain))]
    CyclicDependency {
        /// The cycle, starting and ending with the same package.
        chain: Vec<PackageName>,
    },

    /// A name with no descriptor in the registry.
    #[error("Unknown package '{0}': no descriptor in the registry")]
    UnknownPackage(PackageName),

    /// A dependency was refused or otherwise not resolved.
    #[error("Cannot configure {package}: required dependency {dependency} is not available")]
    MissingDependency {
        /// Package being configured.
        package: PackageName,
        /// The unavailable dependency.
        dependency: PackageName,
    },

    /// A `{dep:x}` argument names a dependency without a known directory.
    #[error("Cannot configure {package}: {dependency} was found in the default search paths, so its install directory is unknown; pass --with-{dependency}-dir")]
    UnlocatedDependency {
        /// Package being configured.
        package: PackageName,
        /// Dependency found in the default search paths.
        dependency: PackageName,
    },

    /// No searched location passed every probe and no download was allowed.
    #[error("Could not find a functional {package} ({miss}); searched: {}", describe_list(.searched))]
    NotFound {
        /// Package being searched for.
        package: PackageName,
        /// Labels of the locations searched.
        searched: Vec<String>,
        /// Probe misses at the last location.
        miss: ProbeMiss,
    },

    /// A configure option that is not recognised or has a bad value.
    #[error("Invalid option '{option}': {reason}")]
    InvalidOption {
        /// The option as given.
        option: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A saved configuration that cannot be read.
    #[error("Invalid config file {}: {reason}", .path.display())]
    InvalidConfigFile {
        /// Path of the file.
        path: PathBuf,
        /// Read or parse error.
        reason: String,
    },

    /// A registry descriptor failed to load or validate.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Filesystem error outside any build step.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigureError {
    /// Package the failure is attributed to, when there is one.
    pub fn package(&self) -> Option<&PackageName> {
        match self {
            Self::ConstraintViolation { package, .. }
            | Self::AcquisitionFailure { package, .. }
            | Self::ToolingMissing { package, .. }
            | Self::BuildFailure { package, .. }
            | Self::VerificationFailure { package, .. }
            | Self::MissingDependency { package, .. }
            | Self::UnlocatedDependency { package, .. }
            | Self::NotFound { package, .. } => Some(package),
            Self::CyclicDependency { chain } => chain.first(),
            Self::UnknownPackage(name) => Some(name),
            Self::InvalidOption { .. }
            | Self::InvalidConfigFile { .. }
            | Self::Descriptor(_)
            | Self::Io(_) => None,
        }
    }

    /// Short category name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConstraintViolation { .. } => "constraint violation",
            Self::AcquisitionFailure { .. } => "acquisition failure",
            Self::ToolingMissing { .. } => "tooling missing",
            Self::BuildFailure { .. } => "build failure",
            Self::VerificationFailure { .. } => "verification failure",
            Self::CyclicDependency { .. } => "cyclic dependency",
            Self::UnknownPackage(_) => "unknown package",
            Self::MissingDependency { .. } => "missing dependency",
            Self::UnlocatedDependency { .. } => "unlocated dependency",
            Self::NotFound { .. } => "not found",
            Self::InvalidOption { .. } => "invalid option",
            Self::InvalidConfigFile { .. } => "invalid config file",
            Self::Descriptor(_) => "invalid descriptor",
            Self::Io(_) => "io",
        }
    }

    pub(crate) fn invalid_option(option: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.to_string(),
        }
    }
}

fn describe_attempts(attempts: &[FetchAttempt]) -> String {
    if attempts.is_empty() {
        return "no download locations declared".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| c.to_string())
}

fn describe_list(items: &[String]) -> String {
    if items.is_empty() {
        return "default compiler search paths".to_string();
    }
    items.join(", ")
}

fn describe_chain(chain: &[PackageName]) -> String {
    chain
        .iter()
        .map(PackageName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
