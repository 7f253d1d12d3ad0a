//! Check command

use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use extpkg_core::Registry;
use extpkg_schema::PackageName;

/// Validate every descriptor and print the static build order.
///
/// Loading the registry validates each descriptor and every dependency
/// reference; planning catches cycles. Nothing is probed or downloaded.
pub fn check(registry_dir: &Path, packages: &[String]) -> Result<()> {
    let registry = Registry::load_dir(registry_dir)
        .with_context(|| format!("Failed to load registry {}", registry_dir.display()))?;

    let roots: Vec<PackageName> = if packages.is_empty() {
        registry.names().cloned().collect()
    } else {
        packages.iter().map(|p| PackageName::new(p)).collect()
    };
    let order = registry.plan(&roots)?;

    println!();
    for (i, name) in order.iter().enumerate() {
        let deps = registry
            .get(name)
            .map(|d| d.deps().iter().map(PackageName::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        if deps.is_empty() {
            println!("  {:>2}. {}", i + 1, name.as_str().white());
        } else {
            println!(
                "  {:>2}. {} {}",
                i + 1,
                name.as_str().white(),
                format!("(after {})", deps.join(", ")).dark_grey()
            );
        }
    }
    println!();
    println!("  {} {} descriptors valid", "✓".green(), registry.len());
    Ok(())
}
