//! extpkg - external package configuration
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Resolves the optional third-party libraries of a native code base: each
//! requested package is either found on the system or downloaded and built
//! from source into a shared prefix.
//!
//! # Directory Layout
//!
//! ```text
//! <prefix>/
//! ├── include/            # headers of every built package
//! ├── lib/                # libraries of every built package
//! ├── externalpackages/   # acquired source trees
//! ├── logs/               # per-step build logs
//! └── extpkg-report.json  # report of the last configure run
//! ```

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Registry directory used when neither `--registry` nor a config file names one.
pub const DEFAULT_REGISTRY: &str = "registry";

/// Install prefix used when neither `--prefix` nor a config file names one.
pub const DEFAULT_PREFIX: &str = "externals";

#[derive(Debug, Parser)]
#[command(name = "extpkg")]
#[command(author, version, about = "extpkg - configure external packages for a native build")]
pub struct Cli {
    /// Directory holding the package descriptors
    #[arg(long, global = true, env = "EXTPKG_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve packages: find them on the system or build them from source
    Configure {
        /// Install prefix shared by every package built from source
        #[arg(long, env = "EXTPKG_PREFIX")]
        prefix: Option<PathBuf>,
        /// Saved configuration applied before the command-line options
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Configure options (--with-<pkg>, --download-<pkg>, --with-precision=, ...)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        options: Vec<String>,
    },
    /// List the packages in the registry
    List,
    /// Validate the registry and print the dependency-first build order
    Check {
        /// Packages to plan for (all when empty)
        packages: Vec<String>,
    },
}

impl Cli {
    /// Registry directory to load, before a config file is considered.
    pub fn registry_dir(&self) -> PathBuf {
        self.registry
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_collects_options() {
        let cli = Cli::parse_from([
            "extpkg",
            "configure",
            "--prefix",
            "/opt/arch",
            "--",
            "--with-hdf5-dir=/usr",
            "--download-med",
        ]);
        let Commands::Configure {
            prefix, options, ..
        } = cli.command
        else {
            panic!("expected configure");
        };
        assert_eq!(prefix, Some(PathBuf::from("/opt/arch")));
        assert_eq!(options, vec!["--with-hdf5-dir=/usr", "--download-med"]);
    }

    #[test]
    fn test_global_registry_flag() {
        let cli = Cli::parse_from(["extpkg", "list", "--registry", "/tmp/reg"]);
        assert_eq!(cli.registry_dir(), PathBuf::from("/tmp/reg"));
        assert!(matches!(cli.command, Commands::List));
    }
}
