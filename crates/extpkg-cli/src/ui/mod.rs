//! Terminal output.

pub mod console;
pub mod list;

pub use console::ConsoleReporter;
