use std::path::Path;

use anyhow::{Context, Result};
use extpkg_core::Registry;

use crate::ui::list::{print_list_footer, print_list_header, print_list_row};

/// List all packages in the registry
pub fn list(registry_dir: &Path) -> Result<()> {
    let registry = Registry::load_dir(registry_dir)
        .with_context(|| format!("Failed to load registry {}", registry_dir.display()))?;

    if registry.is_empty() {
        println!();
        println!("  No package descriptors in {}.", registry_dir.display());
        return Ok(());
    }

    print_list_header();
    for descriptor in registry.iter() {
        print_list_row(descriptor);
    }
    print_list_footer(registry.len());

    Ok(())
}
