//! Configure command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extpkg_core::{
    CompilerProbe, ConfigureError, ConfigureOptions, DependencyGraph, Layout, Registry, Report,
    Reporter, ResolveContext, SourceFetcher, SystemRunner,
};

use crate::ui::ConsoleReporter;
use crate::{DEFAULT_PREFIX, DEFAULT_REGISTRY};

/// Arguments of `extpkg configure`.
#[derive(Debug, Default)]
pub struct ConfigureArgs<'a> {
    pub registry: Option<&'a Path>,
    pub prefix: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub options: &'a [String],
    pub json: bool,
    pub quiet: bool,
}

/// Resolve every requested package and print the report.
///
/// The report is printed (and saved under the prefix) even when resolution
/// fails, naming the package responsible. Runs that fail before resolution
/// starts (bad options, unreadable registry, unknown package) still save a
/// report carrying the error.
pub fn configure(args: &ConfigureArgs<'_>) -> Result<()> {
    let mut options = ConfigureOptions::default();
    let loaded = load_options(args, &mut options);

    let prefix = args
        .prefix
        .map(Path::to_path_buf)
        .or_else(|| options.prefix.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFIX));
    std::fs::create_dir_all(&prefix)
        .with_context(|| format!("Failed to create prefix {}", prefix.display()))?;
    let layout = Layout::new(prefix.canonicalize()?);

    if let Err(err) = loaded {
        return fail_early(&layout, &options, err);
    }

    let registry_dir = args
        .registry
        .map(Path::to_path_buf)
        .or_else(|| options.registry.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY));
    let registry = match Registry::load_dir(&registry_dir) {
        Ok(registry) => registry,
        Err(err) => {
            return fail_early(&layout, &options, err).with_context(|| {
                format!("Failed to load registry {}", registry_dir.display())
            });
        }
    };

    tracing::debug!(
        "configuring with {} descriptors into {}",
        registry.len(),
        layout.prefix().display()
    );

    let reporter = ConsoleReporter::new(args.quiet, args.json);
    let oracle = CompilerProbe::new(&options.build.toolchain.cc, SystemRunner);
    let fetcher = SourceFetcher::new(SystemRunner)?;
    let ctx = ResolveContext {
        config: &options.build,
        layout: &layout,
        intents: &options.intents,
        oracle: &oracle,
        fetcher: &fetcher,
        runner: &SystemRunner,
        reporter: &reporter,
    };
    let mut graph = match DependencyGraph::new(&registry, ctx) {
        Ok(graph) => graph,
        Err(err) => return fail_early(&layout, &options, err),
    };

    let roots = options.roots();
    if roots.is_empty() {
        reporter.warning("no packages requested");
    }
    let result = graph.require_all(&roots);

    let report = Report::new(&graph, result.as_ref().err());
    save_report(&layout, &report)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else if !args.quiet || !report.is_success() {
        println!();
        print!("{report}");
    }

    result?;
    Ok(())
}

/// Saved configuration first, then command-line options on top.
fn load_options(args: &ConfigureArgs<'_>, options: &mut ConfigureOptions) -> extpkg_core::Result<()> {
    if let Some(path) = args.config {
        *options = ConfigureOptions::from_file(path)?;
    }
    options.extend(args.options)
}

fn save_report(layout: &Layout, report: &Report) -> Result<()> {
    let path = layout.report_path();
    std::fs::write(&path, report.to_json()?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Save a report for a run that never reached resolution, then fail.
fn fail_early(layout: &Layout, options: &ConfigureOptions, err: ConfigureError) -> Result<()> {
    save_report(layout, &Report::failed(layout.prefix(), &options.build, &err))?;
    Err(err.into())
}
