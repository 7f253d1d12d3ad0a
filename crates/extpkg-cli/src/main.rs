//! extpkg - external package configuration CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use extpkg_cli::cmd;
use extpkg_cli::cmd::configure::ConfigureArgs;
use extpkg_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Configure {
            prefix,
            config,
            json,
            options,
        } => cmd::configure::configure(&ConfigureArgs {
            registry: cli.registry.as_deref(),
            prefix: prefix.as_deref(),
            config: config.as_deref(),
            options,
            json: *json,
            quiet: cli.quiet,
        }),
        Commands::List => cmd::list::list(&cli.registry_dir()),
        Commands::Check { packages } => cmd::check::check(&cli.registry_dir(), packages),
    }
}
