//! Column-aligned rendering for `extpkg list`.

use crossterm::style::Stylize;
use extpkg_schema::PackageDescriptor;

const NAME_WIDTH: usize = 12;
const PRECISION_WIDTH: usize = 20;
const SOURCE_WIDTH: usize = 8;

/// Print column headers for `extpkg list`
pub fn print_list_header() {
    println!();
    let header = format!(
        "  {:<nw$} {:<pw$} {:<sw$} {}",
        "name",
        "precisions",
        "sources",
        "depends on",
        nw = NAME_WIDTH,
        pw = PRECISION_WIDTH,
        sw = SOURCE_WIDTH,
    );
    println!("{}", header.dark_grey());
}

/// Print a single row for `extpkg list`
pub fn print_list_row(descriptor: &PackageDescriptor) {
    let precisions: Vec<&str> = descriptor
        .capabilities
        .precisions
        .iter()
        .map(|p| p.as_str())
        .collect();
    let mut precisions = precisions.join(",");
    if descriptor.capabilities.complex {
        precisions.push_str(" +complex");
    }
    let deps: Vec<&str> = descriptor.deps().iter().map(|d| d.as_str()).collect();

    let name_part = format!("{:<NAME_WIDTH$}", descriptor.name().as_str());
    let precision_part = format!("{precisions:<PRECISION_WIDTH$}");
    let source_part = format!("{:<SOURCE_WIDTH$}", descriptor.sources.len());
    let deps_part = if deps.is_empty() {
        "-".to_string()
    } else {
        deps.join(", ")
    };

    println!(
        "  {} {} {} {}",
        name_part.white(),
        precision_part.dark_grey(),
        source_part.dark_grey(),
        deps_part.dark_grey()
    );
    if !descriptor.package.description.is_empty() {
        println!(
            "  {:<NAME_WIDTH$} {}",
            "",
            descriptor.package.description.as_str().dark_grey()
        );
    }
}

/// Print footer for `extpkg list`
pub fn print_list_footer(count: usize) {
    println!();
    let noun = if count == 1 { "package" } else { "packages" };
    println!("  {}", format!("{count} {noun}").dark_grey());
}
