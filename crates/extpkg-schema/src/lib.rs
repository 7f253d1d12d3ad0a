//! Shared types for extpkg.
//!
//! Everything here is plain data: package identity, descriptor tables as they
//! are stored in the registry, the ambient build configuration and the user's
//! per-package intent. No probing, fetching or process execution happens in
//! this crate.

pub mod config;
pub mod descriptor;
pub mod intent;
pub mod name;

// Re-exports
pub use config::*;
pub use descriptor::{
    BootstrapSpec, BuildSpec, BuildSystem, Capabilities, Dependencies, DescriptorError,
    GENERIC_ARG_KEYS, PackageDescriptor, PackageInfo, Requirements, SourceLocation,
    dep_placeholders,
};
pub use intent::{DownloadMode, PackageIntent};
pub use name::PackageName;
