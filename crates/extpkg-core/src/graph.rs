//! Memoized, dependency-first resolution of the package graph.
//!
//! [`DependencyGraph::require`] resolves a package exactly once per run: a
//! constraint check first, then its dependencies, then either a probe of the
//! system or a build from source. Later requests return the cached
//! [`ResolvedPackage`] without probing again, so diamond-shaped graphs never
//! resolve a shared dependency twice.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use extpkg_schema::{
    BuildConfig, DownloadMode, PackageDescriptor, PackageIntent, PackageName, ParallelRuntime,
};
use serde::Serialize;

use crate::constraints::check_compatibility;
use crate::error::{ConfigureError, Result};
use crate::fetch::Fetcher;
use crate::options::Intents;
use crate::paths::Layout;
use crate::pipeline::{DependencyContext, InstallPipeline};
use crate::probe::{ProbeMiss, ProbeOracle, ResolvedLocation, SearchCandidate, probe_location};
use crate::process::ProcessRunner;
use crate::registry::Registry;
use crate::reporter::Reporter;

/// How a package ended up satisfied, or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Resolution {
    /// Not wanted by anything; not configured.
    Skipped,
    /// An existing installation passed every probe.
    Found(ResolvedLocation),
    /// Built from source into the shared prefix.
    Installed(ResolvedLocation),
    /// The parallel runtime package, provided by the no-op stub.
    Stub,
}

/// A package after resolution. Shared by every dependent.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    /// Registry name.
    pub name: PackageName,
    /// Descriptor the package was resolved from.
    pub descriptor: Arc<PackageDescriptor>,
    /// Outcome.
    pub resolution: Resolution,
}

impl ResolvedPackage {
    /// Headers and libraries, for found and installed packages.
    pub fn location(&self) -> Option<&ResolvedLocation> {
        match &self.resolution {
            Resolution::Found(loc) | Resolution::Installed(loc) => Some(loc),
            Resolution::Skipped | Resolution::Stub => None,
        }
    }

    /// Whether dependents may build against this package.
    pub fn is_available(&self) -> bool {
        !matches!(self.resolution, Resolution::Skipped)
    }
}

/// Everything resolution reads but never changes.
pub struct ResolveContext<'a> {
    /// Ambient build configuration.
    pub config: &'a BuildConfig,
    /// Shared install prefix.
    pub layout: &'a Layout,
    /// What the user asked for each package.
    pub intents: &'a Intents,
    /// Header, library and symbol checks.
    pub oracle: &'a dyn ProbeOracle,
    /// Source acquisition for downloads.
    pub fetcher: &'a dyn Fetcher,
    /// Runs bootstrap and build steps.
    pub runner: &'a dyn ProcessRunner,
    /// Progress output.
    pub reporter: &'a dyn Reporter,
}

impl fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("config", self.config)
            .field("layout", self.layout)
            .field("intents", self.intents)
            .finish_non_exhaustive()
    }
}

/// Packages wanted by the user, directly or as a dependency of something
/// wanted. An explicit `--with-<pkg>=0` removes a package (and whatever only
/// it pulled in) no matter who asks for it.
pub fn wanted_closure(registry: &Registry, intents: &Intents) -> HashSet<PackageName> {
    let disabled = |name: &PackageName| intents.get(name).is_some_and(|i| i.disabled);

    let mut wanted = HashSet::new();
    let mut stack: Vec<PackageName> = intents
        .iter()
        .filter(|(_, intent)| intent.is_wanted())
        .map(|(name, _)| name.clone())
        .collect();
    while let Some(name) = stack.pop() {
        if disabled(&name) || wanted.contains(&name) {
            continue;
        }
        if let Some(descriptor) = registry.get(&name) {
            stack.extend(descriptor.deps().iter().cloned());
        }
        wanted.insert(name);
    }
    wanted
}

/// The resolution state of one configuration run.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    registry: &'a Registry,
    ctx: ResolveContext<'a>,
    wanted: HashSet<PackageName>,
    cache: BTreeMap<PackageName, Arc<ResolvedPackage>>,
    order: Vec<PackageName>,
    visiting: Vec<PackageName>,
}

impl<'a> DependencyGraph<'a> {
    /// Prepare a run over `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::UnknownPackage`] if an intent names a
    /// package with no descriptor.
    pub fn new(registry: &'a Registry, ctx: ResolveContext<'a>) -> Result<Self> {
        if let Some(name) = ctx.intents.keys().find(|name| !registry.contains(name)) {
            return Err(ConfigureError::UnknownPackage(name.clone()));
        }
        let wanted = wanted_closure(registry, ctx.intents);
        Ok(Self {
            registry,
            ctx,
            wanted,
            cache: BTreeMap::new(),
            order: Vec::new(),
            visiting: Vec::new(),
        })
    }

    /// Whether `name` will be configured.
    pub fn is_wanted(&self, name: &PackageName) -> bool {
        self.wanted.contains(name)
    }

    /// Resolve every package in `roots`.
    ///
    /// # Errors
    ///
    /// Stops at the first package that cannot be resolved.
    pub fn require_all(&mut self, roots: &[PackageName]) -> Result<()> {
        self.ctx.reporter.section("Resolving packages");
        for name in roots {
            self.require(name)?;
        }
        Ok(())
    }

    /// Resolve `name` and everything it depends on, once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::CyclicDependency`] if `name` is reached again
    /// while its own dependencies are being resolved, and otherwise the first
    /// error from resolving it or any dependency.
    pub fn require(&mut self, name: &PackageName) -> Result<Arc<ResolvedPackage>> {
        if let Some(done) = self.cache.get(name) {
            return Ok(Arc::clone(done));
        }
        if let Some(pos) = self.visiting.iter().position(|n| n == name) {
            let mut chain = self.visiting[pos..].to_vec();
            chain.push(name.clone());
            return Err(ConfigureError::CyclicDependency { chain });
        }

        let descriptor = Arc::clone(
            self.registry
                .get(name)
                .ok_or_else(|| ConfigureError::UnknownPackage(name.clone()))?,
        );

        // A doomed package fails under its own name before any dependency is
        // probed or built.
        if self.wanted.contains(name) {
            self.check_constraints(&descriptor).inspect_err(|e| {
                self.ctx.reporter.failed(name, &e.to_string());
            })?;
        }

        self.visiting.push(name.clone());
        let deps = self.require_deps(&descriptor);
        self.visiting.pop();
        let deps = deps?;

        let resolution = self.resolve(&descriptor, &deps).inspect_err(|e| {
            self.ctx.reporter.failed(name, &e.to_string());
        })?;

        let resolved = Arc::new(ResolvedPackage {
            name: name.clone(),
            descriptor,
            resolution,
        });
        self.cache.insert(name.clone(), Arc::clone(&resolved));
        self.order.push(name.clone());
        Ok(resolved)
    }

    fn require_deps(&mut self, descriptor: &PackageDescriptor) -> Result<Vec<Arc<ResolvedPackage>>> {
        descriptor
            .deps()
            .iter()
            .map(|dep| self.require(dep))
            .collect()
    }

    /// A resolved package, if it has been resolved.
    pub fn get(&self, name: &str) -> Option<&Arc<ResolvedPackage>> {
        self.cache.get(name)
    }

    /// Resolved packages, dependencies before dependents.
    pub fn resolved(&self) -> impl Iterator<Item = &Arc<ResolvedPackage>> {
        self.order.iter().filter_map(|name| self.cache.get(name))
    }

    /// Names of the resolved packages, dependencies before dependents.
    pub fn resolution_order(&self) -> &[PackageName] {
        &self.order
    }

    /// Build configuration of this run.
    pub fn config(&self) -> &BuildConfig {
        self.ctx.config
    }

    /// Install layout of this run.
    pub fn layout(&self) -> &Layout {
        self.ctx.layout
    }

    fn check_constraints(&self, descriptor: &PackageDescriptor) -> Result<()> {
        check_compatibility(descriptor, self.ctx.config).map_err(|violation| {
            ConfigureError::ConstraintViolation {
                package: descriptor.name().clone(),
                violation,
            }
        })
    }

    fn resolve(
        &self,
        descriptor: &PackageDescriptor,
        deps: &[Arc<ResolvedPackage>],
    ) -> Result<Resolution> {
        let name = descriptor.name();
        if !self.wanted.contains(name) {
            tracing::debug!("{name} not wanted, skipping");
            self.ctx.reporter.skipped(name);
            return Ok(Resolution::Skipped);
        }

        if self.ctx.config.runtime == ParallelRuntime::Stub && name == ParallelRuntime::PACKAGE {
            tracing::info!("{name} provided by the no-op stub");
            self.ctx.reporter.found(name, "no-op stub");
            return Ok(Resolution::Stub);
        }

        if let Some(dep) = deps.iter().find(|dep| !dep.is_available()) {
            return Err(ConfigureError::MissingDependency {
                package: name.clone(),
                dependency: dep.name.clone(),
            });
        }

        let intent = self.ctx.intents.get(name).cloned().unwrap_or_default();
        let dep_ctx = self.dependency_context(descriptor);

        if intent.download == DownloadMode::Yes {
            return self.install(descriptor, &dep_ctx);
        }

        self.ctx.reporter.probing(name);
        let mut searched = Vec::new();
        let mut last_miss = ProbeMiss::default();
        for candidate in search_candidates(&intent) {
            match probe_location(self.ctx.oracle, descriptor, &candidate, &dep_ctx.linkage) {
                Ok(location) => {
                    tracing::info!("found {name} at {}", candidate.label);
                    self.ctx.reporter.found(name, &candidate.label);
                    return Ok(Resolution::Found(location));
                }
                Err(miss) => {
                    tracing::debug!("{name} not usable at {}: {miss}", candidate.label);
                    searched.push(candidate.label);
                    last_miss = miss;
                }
            }
        }

        if intent.download == DownloadMode::IfNeeded && descriptor.is_downloadable() {
            tracing::info!("{name} not found, building from source");
            return self.install(descriptor, &dep_ctx);
        }

        Err(ConfigureError::NotFound {
            package: name.clone(),
            searched,
            miss: last_miss,
        })
    }

    fn install(
        &self,
        descriptor: &PackageDescriptor,
        dep_ctx: &DependencyContext,
    ) -> Result<Resolution> {
        let pipeline = InstallPipeline {
            config: self.ctx.config,
            layout: self.ctx.layout,
            fetcher: self.ctx.fetcher,
            runner: self.ctx.runner,
            oracle: self.ctx.oracle,
            reporter: self.ctx.reporter,
        };
        let location = pipeline.install(descriptor, dep_ctx)?;
        self.ctx
            .reporter
            .installed(descriptor.name(), &self.ctx.layout.prefix().display().to_string());
        Ok(Resolution::Installed(location))
    }

    /// Directories of the direct dependencies and link information of the
    /// whole dependency closure, nearest dependencies first.
    fn dependency_context(&self, descriptor: &PackageDescriptor) -> DependencyContext {
        let mut ctx = DependencyContext::default();
        for dep in descriptor.deps() {
            if let Some(resolved) = self.cache.get(dep) {
                let dir = resolved.location().and_then(|loc| loc.directory.clone());
                ctx.dirs.insert(dep.clone(), dir);
            }
        }
        let mut seen = HashSet::new();
        self.collect_linkage(descriptor.deps(), &mut seen, &mut ctx.linkage);
        ctx
    }

    fn collect_linkage(
        &self,
        deps: &[PackageName],
        seen: &mut HashSet<PackageName>,
        out: &mut ResolvedLocation,
    ) {
        for dep in deps {
            if !seen.insert(dep.clone()) {
                continue;
            }
            let Some(resolved) = self.cache.get(dep) else {
                continue;
            };
            if let Some(loc) = resolved.location() {
                for dir in &loc.include_dirs {
                    if !out.include_dirs.contains(dir) {
                        out.include_dirs.push(dir.clone());
                    }
                }
                for lib in &loc.libraries {
                    if !out.libraries.contains(lib) {
                        out.libraries.push(lib.clone());
                    }
                }
            }
            self.collect_linkage(resolved.descriptor.deps(), seen, out);
        }
    }
}

/// Where to look for an existing installation, most specific first.
///
/// Explicit locations replace the default search instead of adding to it.
/// With an install directory, explicit include or library paths override
/// only their half of its layout.
fn search_candidates(intent: &PackageIntent) -> Vec<SearchCandidate> {
    if !intent.has_explicit_location() {
        return vec![SearchCandidate::system()];
    }
    let Some(dir) = &intent.dir else {
        return vec![SearchCandidate::explicit(&intent.include, &intent.lib)];
    };
    let from_dir = SearchCandidate::from_dir(dir);
    if intent.include.is_empty() && intent.lib.is_empty() {
        return vec![from_dir];
    }
    let mut candidate = SearchCandidate::explicit(&intent.include, &intent.lib);
    if candidate.include_dirs.is_empty() {
        candidate.include_dirs = from_dir.include_dirs;
    }
    if candidate.libraries.is_empty() {
        candidate.lib_dirs = from_dir.lib_dirs;
    }
    candidate.directory = from_dir.directory;
    vec![candidate]
}
