//! Reporter trait for dependency injection
//!
//! Lets the graph and the install pipeline report progress without being
//! coupled to a terminal implementation.

use extpkg_schema::PackageName;

use crate::pipeline::Step;

/// Receives progress events from resolution and the install pipeline.
pub trait Reporter {
    /// A new phase of the run has started (e.g. "Resolving packages").
    fn section(&self, title: &str);

    /// A package is not wanted and will not be configured.
    fn skipped(&self, name: &PackageName);

    /// The system is being searched for an existing installation.
    fn probing(&self, name: &PackageName);

    /// An existing installation satisfied every requirement.
    fn found(&self, name: &PackageName, detail: &str);

    /// One step of the install pipeline has started.
    fn step(&self, name: &PackageName, step: Step, detail: &str);

    /// The pipeline finished and verification passed.
    fn installed(&self, name: &PackageName, detail: &str);

    /// Resolution of a package failed.
    fn failed(&self, name: &PackageName, reason: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn skipped(&self, name: &PackageName) {
        (**self).skipped(name);
    }
    fn probing(&self, name: &PackageName) {
        (**self).probing(name);
    }
    fn found(&self, name: &PackageName, detail: &str) {
        (**self).found(name, detail);
    }
    fn step(&self, name: &PackageName, step: Step, detail: &str) {
        (**self).step(name, step, detail);
    }
    fn installed(&self, name: &PackageName, detail: &str) {
        (**self).installed(name, detail);
    }
    fn failed(&self, name: &PackageName, reason: &str) {
        (**self).failed(name, reason);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn skipped(&self, _: &PackageName) {}
    fn probing(&self, _: &PackageName) {}
    fn found(&self, _: &PackageName, _: &str) {}
    fn step(&self, _: &PackageName, _: Step, _: &str) {}
    fn installed(&self, _: &PackageName, _: &str) {}
    fn failed(&self, _: &PackageName, _: &str) {}
    fn warning(&self, _: &str) {}
}
