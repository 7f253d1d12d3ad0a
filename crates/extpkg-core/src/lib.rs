//! extpkg core: resolves the third-party packages a scientific code base
//! builds against.
//!
//! Each package is either found on the system (header, library and symbol
//! probes) or downloaded and built from source into a shared prefix. The
//! [`DependencyGraph`] drives resolution dependency-first and caches every
//! result; the [`InstallPipeline`] runs the from-source build.

pub mod constraints;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod options;
pub mod paths;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod registry;
pub mod report;
pub mod reporter;

pub use constraints::{ConstraintViolation, check_compatibility};
pub use error::{ConfigureError, Result};
pub use fetch::{FetchAttempt, Fetcher, SourceFetcher};
pub use graph::{DependencyGraph, Resolution, ResolveContext, ResolvedPackage};
pub use options::{ConfigureOptions, Intents};
pub use paths::Layout;
pub use pipeline::{DependencyContext, InstallPipeline, Step, configure_args};
pub use probe::{CompilerProbe, ProbeMiss, ProbeOracle, ResolvedLocation, SearchCandidate};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemRunner};
pub use registry::Registry;
pub use report::{PackageStatus, Report};
pub use reporter::{NullReporter, Reporter};
