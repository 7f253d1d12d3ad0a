//! Build-from-source pipeline shared by every downloadable package.
//!
//! Acquire → Bootstrap (optional) → Configure → Build → Install → Verify.
//!
//! Every step either completes or aborts the pipeline with a typed error.
//! Nothing is retried and nothing partial is remembered: a rerun after manual
//! remediation starts again from Acquire with a fresh source directory.
//!
//! ## Configure environment
//!
//! Configure runs with the include and library locations of every resolved
//! dependency exported, so autotools and CMake checks see them:
//!
//! | Variable | Value |
//! |---|---|
//! | `CPPFLAGS` | `-I` flag for each dependency include directory |
//! | `LDFLAGS` | `-L` flag for each dependency library directory |
//! | `PKG_CONFIG_PATH` | `<prefix>/lib/pkgconfig` |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use extpkg_schema::{
    BootstrapSpec, BuildConfig, BuildSystem, PackageDescriptor, PackageName, dep_placeholders,
};
use serde::Serialize;

use crate::error::{ConfigureError, Result};
use crate::fetch::{FetchAttempt, Fetcher};
use crate::paths::Layout;
use crate::probe::{ProbeOracle, ResolvedLocation, SearchCandidate, probe_location};
use crate::process::{CommandSpec, ProcessRunner};
use crate::reporter::Reporter;

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Download or copy the source tree.
    Acquire,
    /// Regenerate the build system (`autoreconf` and friends).
    Bootstrap,
    /// Run `configure` or `cmake`.
    Configure,
    /// Compile.
    Build,
    /// Install into the shared prefix.
    Install,
    /// Probe the prefix for the installed package.
    Verify,
}

impl Step {
    /// Lowercase name, used in log file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Bootstrap => "bootstrap",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a package's build sees of its resolved dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyContext {
    /// Resolved install directory of each direct dependency; `None` when it
    /// was found in the default search paths.
    pub dirs: BTreeMap<PackageName, Option<PathBuf>>,
    /// Include directories and libraries of the whole dependency closure.
    pub linkage: ResolvedLocation,
}

/// Generic configure arguments, keyed by the name a descriptor uses to
/// suppress them.
fn generic_args(system: BuildSystem, config: &BuildConfig, prefix: &Path) -> Vec<(&'static str, String)> {
    let tc = &config.toolchain;
    let prefix = prefix.display();
    let mut args = Vec::new();
    match system {
        BuildSystem::Gnu => {
            args.push(("prefix", format!("--prefix={prefix}")));
            args.push(("CC", format!("CC={}", tc.cc)));
            args.push(("CXX", format!("CXX={}", tc.cxx)));
            if let Some(fc) = &tc.fc {
                args.push(("FC", format!("FC={fc}")));
            }
            if let Some(cflags) = &tc.cflags {
                args.push(("CFLAGS", format!("CFLAGS={cflags}")));
            }
        }
        BuildSystem::Cmake => {
            args.push(("prefix", format!("-DCMAKE_INSTALL_PREFIX={prefix}")));
            args.push(("CC", format!("-DCMAKE_C_COMPILER={}", tc.cc)));
            args.push(("CXX", format!("-DCMAKE_CXX_COMPILER={}", tc.cxx)));
            if let Some(fc) = &tc.fc {
                args.push(("FC", format!("-DCMAKE_Fortran_COMPILER={fc}")));
            }
            if let Some(cflags) = &tc.cflags {
                args.push(("CFLAGS", format!("-DCMAKE_C_FLAGS={cflags}")));
            }
        }
    }
    args
}

/// Assemble the full configure argument list for `descriptor`.
///
/// Generic arguments (install prefix, compilers, flags) come first, minus the
/// keys listed in the descriptor's `suppress_generic`. The package's own
/// arguments follow, with `{dep:<name>}` replaced by that dependency's
/// resolved install directory.
///
/// # Errors
///
/// Returns [`ConfigureError::UnlocatedDependency`] when a placeholder names a
/// dependency that was found without a known install directory, and
/// [`ConfigureError::MissingDependency`] when it names one that is not in
/// `deps` at all.
pub fn configure_args(
    descriptor: &PackageDescriptor,
    config: &BuildConfig,
    prefix: &Path,
    deps: &DependencyContext,
) -> Result<Vec<String>> {
    let suppressed = &descriptor.build.suppress_generic;
    let mut args: Vec<String> = generic_args(descriptor.build.system, config, prefix)
        .into_iter()
        .filter(|(key, _)| !suppressed.iter().any(|s| s == key))
        .map(|(_, arg)| arg)
        .collect();

    for arg in &descriptor.build.configure_args {
        let mut expanded = arg.clone();
        for dep in dep_placeholders(arg) {
            let dir = match deps.dirs.get(dep) {
                Some(Some(dir)) => dir,
                Some(None) => {
                    return Err(ConfigureError::UnlocatedDependency {
                        package: descriptor.name().clone(),
                        dependency: PackageName::new(dep),
                    });
                }
                None => {
                    return Err(ConfigureError::MissingDependency {
                        package: descriptor.name().clone(),
                        dependency: PackageName::new(dep),
                    });
                }
            };
            expanded = expanded.replace(&format!("{{dep:{dep}}}"), &dir.display().to_string());
        }
        args.push(expanded);
    }
    Ok(args)
}

/// Turns a descriptor into an installed, verified library under the shared
/// prefix.
pub struct InstallPipeline<'a> {
    /// Compilers, flags and job count.
    pub config: &'a BuildConfig,
    /// Where sources, logs and installs go.
    pub layout: &'a Layout,
    /// Acquires the source tree.
    pub fetcher: &'a dyn Fetcher,
    /// Runs bootstrap, configure, build and install.
    pub runner: &'a dyn ProcessRunner,
    /// Verifies the result.
    pub oracle: &'a dyn ProbeOracle,
    /// Progress output.
    pub reporter: &'a dyn Reporter,
}

impl fmt::Debug for InstallPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallPipeline")
            .field("layout", self.layout)
            .finish_non_exhaustive()
    }
}

impl InstallPipeline<'_> {
    /// Run every step for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns the typed error of the first failing step:
    /// [`ConfigureError::AcquisitionFailure`], [`ConfigureError::ToolingMissing`],
    /// [`ConfigureError::BuildFailure`] or [`ConfigureError::VerificationFailure`].
    pub fn install(
        &self,
        descriptor: &PackageDescriptor,
        deps: &DependencyContext,
    ) -> Result<ResolvedLocation> {
        let name = descriptor.name();
        tracing::info!("installing {name} into {}", self.layout.prefix().display());

        let source_dir = self.acquire(descriptor)?;

        if let Some(bootstrap) = &descriptor.build.bootstrap {
            self.bootstrap(name, bootstrap, &source_dir)?;
        }

        let args = configure_args(descriptor, self.config, self.layout.prefix(), deps)?;
        let jobs = self.config.jobs.unwrap_or_else(num_cpus::get).max(1);
        let (configure, build, install) = match descriptor.build.system {
            BuildSystem::Gnu => (
                CommandSpec::new(source_dir.join("configure").to_string_lossy()).args(args),
                CommandSpec::new("make").arg(format!("-j{jobs}")),
                CommandSpec::new("make").arg("install"),
            ),
            BuildSystem::Cmake => {
                let build_dir = source_dir.join("extpkg-build");
                let build_dir = build_dir.to_string_lossy().to_string();
                (
                    CommandSpec::new("cmake")
                        .arg("-S")
                        .arg(source_dir.to_string_lossy())
                        .arg("-B")
                        .arg(&build_dir)
                        .args(args),
                    CommandSpec::new("cmake")
                        .arg("--build")
                        .arg(&build_dir)
                        .arg("-j")
                        .arg(jobs.to_string()),
                    CommandSpec::new("cmake").arg("--install").arg(&build_dir),
                )
            }
        };

        let configure = self.with_dependency_env(configure, deps);
        self.run_step(name, Step::Configure, configure.cwd(&source_dir))?;
        self.run_step(name, Step::Build, build.cwd(&source_dir))?;
        self.run_step(name, Step::Install, install.cwd(&source_dir))?;

        self.verify(descriptor, deps)
    }

    /// Try each declared source in order; the first readable tree wins.
    fn acquire(&self, descriptor: &PackageDescriptor) -> Result<PathBuf> {
        let name = descriptor.name();
        let dest = self.layout.source_dir(name);
        std::fs::create_dir_all(self.layout.packages_dir())?;

        let mut attempts = Vec::new();
        for location in &descriptor.sources {
            remove_tree(&dest)?;
            self.reporter
                .step(name, Step::Acquire, &location.to_string());
            match self.fetcher.fetch(location, &dest) {
                Ok(()) if is_populated(&dest) => {
                    tracing::info!("obtained {name} from {location}");
                    return Ok(dest.canonicalize()?);
                }
                Ok(()) => attempts.push(FetchAttempt {
                    location: location.clone(),
                    reason: "no readable source tree".to_string(),
                }),
                Err(e) => {
                    tracing::warn!("could not obtain {name} from {location}: {e:#}");
                    attempts.push(FetchAttempt {
                        location: location.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        remove_tree(&dest)?;
        Err(ConfigureError::AcquisitionFailure {
            package: name.clone(),
            attempts,
        })
    }

    fn bootstrap(
        &self,
        name: &PackageName,
        bootstrap: &BootstrapSpec,
        source_dir: &Path,
    ) -> Result<()> {
        if let Some(tool) = bootstrap.tools.iter().find(|t| !self.runner.has_tool(t)) {
            return Err(ConfigureError::ToolingMissing {
                package: name.clone(),
                tool: tool.clone(),
            });
        }
        self.run_step(
            name,
            Step::Bootstrap,
            CommandSpec::shell(&bootstrap.script).cwd(source_dir),
        )
    }

    fn with_dependency_env(&self, cmd: CommandSpec, deps: &DependencyContext) -> CommandSpec {
        let cppflags: Vec<String> = deps
            .linkage
            .include_dirs
            .iter()
            .map(|d| format!("-I{}", d.display()))
            .collect();
        let mut lib_dirs: Vec<&Path> = Vec::new();
        for lib in &deps.linkage.libraries {
            if let Some(parent) = lib.parent() {
                if !lib_dirs.contains(&parent) {
                    lib_dirs.push(parent);
                }
            }
        }
        let ldflags: Vec<String> = lib_dirs
            .iter()
            .map(|d| format!("-L{}", d.display()))
            .collect();

        let mut cmd = cmd.env(
            "PKG_CONFIG_PATH",
            self.layout.lib_dir().join("pkgconfig").to_string_lossy(),
        );
        if !cppflags.is_empty() {
            cmd = cmd.env("CPPFLAGS", cppflags.join(" "));
        }
        if !ldflags.is_empty() {
            cmd = cmd.env("LDFLAGS", ldflags.join(" "));
        }
        cmd
    }

    fn run_step(&self, name: &PackageName, step: Step, cmd: CommandSpec) -> Result<()> {
        self.reporter.step(name, step, &cmd.to_string());
        tracing::info!("{step} {name}: {cmd}");

        let cmd = cmd.log(self.layout.build_log_path(name, step.as_str()));
        let out = self.runner.run(&cmd)?;
        if out.success() {
            return Ok(());
        }
        Err(ConfigureError::BuildFailure {
            package: name.clone(),
            step,
            code: out.code,
            output: out.output,
            log: out.log,
        })
    }

    /// Probe the shared prefix for everything the descriptor requires.
    fn verify(
        &self,
        descriptor: &PackageDescriptor,
        deps: &DependencyContext,
    ) -> Result<ResolvedLocation> {
        let name = descriptor.name();
        self.reporter.step(name, Step::Verify, "");
        let candidate = SearchCandidate::from_dir(self.layout.prefix());
        probe_location(self.oracle, descriptor, &candidate, &deps.linkage).map_err(|miss| {
            ConfigureError::VerificationFailure {
                package: name.clone(),
                miss,
            }
        })
    }
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

fn remove_tree(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}
