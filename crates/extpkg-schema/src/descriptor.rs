//! TOML package descriptors.
//!
//! One file per external package, stored in the registry directory:
//!
//! ```toml
//! [package]
//! name = "med"
//! description = "MED-fichier mesh and field I/O"
//!
//! [[sources]]
//! kind = "git"
//! url = "https://bitbucket.org/petsc/pkg-med.git"
//! commit = "643c242b8c1cdc2f99b528b16053d276b96cf249"
//!
//! [[sources]]
//! kind = "archive"
//! url = "http://files.salome-platform.org/Salome/other/med-3.3.1.tar.gz"
//!
//! [requires]
//! functions = ["MEDfileOpen"]
//! includes = ["med.h"]
//! libraries = [["libmed.a"]]
//!
//! [capabilities]
//! precisions = ["double"]
//! needs_math = true
//! needs_mpi = true
//!
//! [dependencies]
//! packages = ["mpi", "hdf5", "mathlib"]
//!
//! [build]
//! configure_args = ["--disable-python", "--with-hdf5={dep:hdf5}"]
//! bootstrap = { script = "./bootstrap", tools = ["libtoolize", "autoreconf"] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Precision;
use crate::name::PackageName;

/// Keys of the generic configure arguments a package may suppress.
pub const GENERIC_ARG_KEYS: [&str; 5] = ["prefix", "CC", "CXX", "FC", "CFLAGS"];

/// Errors that can occur when loading or validating a descriptor.
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// An I/O error occurred while reading a descriptor file.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML content could not be deserialized into a descriptor.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The descriptor parsed but violates a structural rule.
    #[error("Invalid descriptor for '{package}': {reason}")]
    Invalid {
        /// Package the descriptor belongs to.
        package: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Identity of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Unique lowercase name.
    pub name: PackageName,
    /// Short human-readable summary.
    #[serde(default)]
    pub description: String,
}

/// One place a package's source tree can be obtained from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceLocation {
    /// A version-control repository, optionally pinned to a commit.
    Git {
        /// Clone URL.
        url: String,
        /// Commit or tag to check out after cloning.
        #[serde(default)]
        commit: Option<String>,
    },
    /// A gzip-compressed tarball.
    Archive {
        /// Download URL.
        url: String,
        /// Expected SHA-256 of the tarball, when known.
        #[serde(default)]
        sha256: Option<String>,
    },
    /// A source tree already present on local disk.
    Local {
        /// Directory holding the tree.
        path: PathBuf,
    },
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git {
                url,
                commit: Some(commit),
            } => write!(f, "git:{url}@{commit}"),
            Self::Git { url, commit: None } => write!(f, "git:{url}"),
            Self::Archive { url, .. } => f.write_str(url),
            Self::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

/// What must be present for the package to count as found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    /// Symbols that must link.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Headers that must preprocess.
    #[serde(default)]
    pub includes: Vec<String>,
    /// Candidate library-file combinations; any one complete set is enough.
    #[serde(default)]
    pub libraries: Vec<Vec<String>>,
}

/// Compiled-in limitations of the third-party code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Scalar precisions the package supports.
    #[serde(default = "default_precisions")]
    pub precisions: Vec<Precision>,
    /// Whether complex scalars are supported.
    #[serde(default)]
    pub complex: bool,
    /// Whether 64-bit indices are supported.
    #[serde(default)]
    pub index64: bool,
    /// Whether the math library must be linked alongside.
    #[serde(default)]
    pub needs_math: bool,
    /// Whether a real parallel runtime is required.
    #[serde(default)]
    pub needs_mpi: bool,
}

fn default_precisions() -> Vec<Precision> {
    vec![Precision::Double]
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            precisions: default_precisions(),
            complex: false,
            index64: false,
            needs_math: false,
            needs_mpi: false,
        }
    }
}

/// Sub-dependencies configured before this package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Package names, in the order they are required.
    #[serde(default)]
    pub packages: Vec<PackageName>,
}

/// Native build system driving configure/build/install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    /// `./configure && make && make install` (default).
    #[default]
    Gnu,
    /// `cmake`, `cmake --build`, `cmake --install`.
    Cmake,
}

/// Regeneration of the build scripts before configure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSpec {
    /// Shell command run in the source tree.
    pub script: String,
    /// Tools that must be on `PATH` for the script to work.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// How the package is built once acquired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Native build system.
    #[serde(default)]
    pub system: BuildSystem,
    /// Optional bootstrap step.
    #[serde(default)]
    pub bootstrap: Option<BootstrapSpec>,
    /// Package-specific configure arguments; `{dep:<name>}` expands to the
    /// dependency's resolved install directory.
    #[serde(default)]
    pub configure_args: Vec<String>,
    /// Generic argument keys (see [`GENERIC_ARG_KEYS`]) this package drops.
    #[serde(default)]
    pub suppress_generic: Vec<String>,
}

/// Complete declarative record for one external package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Identity.
    pub package: PackageInfo,
    /// Acquisition sources, tried in order.
    #[serde(default)]
    pub sources: Vec<SourceLocation>,
    /// Structural requirements checked by probes.
    #[serde(default)]
    pub requires: Requirements,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Sub-dependencies.
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Native build description.
    #[serde(default)]
    pub build: BuildSpec,
}

impl PackageDescriptor {
    /// Parse a descriptor from a TOML file on disk and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Io`] if the file cannot be read,
    /// [`DescriptorError::Parse`] if the TOML is malformed, or
    /// [`DescriptorError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let content = fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a descriptor from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Parse`] or [`DescriptorError::Invalid`].
    pub fn parse(content: &str) -> Result<Self, DescriptorError> {
        let descriptor: Self = toml::from_str(content)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// The package name.
    pub fn name(&self) -> &PackageName {
        &self.package.name
    }

    /// Declared sub-dependencies.
    pub fn deps(&self) -> &[PackageName] {
        &self.dependencies.packages
    }

    /// Whether any acquisition source is declared.
    pub fn is_downloadable(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Check the structural rules a registry entry must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Invalid`] naming the first broken rule.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let invalid = |reason: String| DescriptorError::Invalid {
            package: self.package.name.to_string(),
            reason,
        };

        let name = &self.package.name;
        if !name.is_well_formed() {
            return Err(invalid(
                "name must be non-empty and use only [a-z0-9_-]".to_string(),
            ));
        }

        let deps = self.deps();
        for (i, dep) in deps.iter().enumerate() {
            if dep == name {
                return Err(invalid("package depends on itself".to_string()));
            }
            if deps[..i].contains(dep) {
                return Err(invalid(format!("dependency '{dep}' listed twice")));
            }
        }

        if self.requires.libraries.iter().any(Vec::is_empty) {
            return Err(invalid("empty library combination".to_string()));
        }

        if self.capabilities.precisions.is_empty() {
            return Err(invalid("no supported precision declared".to_string()));
        }

        for arg in &self.build.configure_args {
            for dep in dep_placeholders(arg) {
                if !deps.iter().any(|d| d == dep) {
                    return Err(invalid(format!(
                        "configure argument '{arg}' references undeclared dependency '{dep}'"
                    )));
                }
            }
        }

        for key in &self.build.suppress_generic {
            if !GENERIC_ARG_KEYS.contains(&key.as_str()) {
                return Err(invalid(format!(
                    "unknown generic argument '{key}' in suppress_generic"
                )));
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for PackageDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Dependency names referenced by `{dep:<name>}` placeholders in `arg`.
pub fn dep_placeholders(arg: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = arg;
    while let Some(start) = rest.find("{dep:") {
        let after = &rest[start + 5..];
        let Some(end) = after.find('}') else {
            break;
        };
        found.push(&after[..end]);
        rest = &after[end + 1..];
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const MED: &str = r#"
[package]
name = "med"

[[sources]]
kind = "git"
url = "https://bitbucket.org/petsc/pkg-med.git"
commit = "643c242b8c1cdc2f99b528b16053d276b96cf249"

[[sources]]
kind = "archive"
url = "http://files.salome-platform.org/Salome/other/med-3.3.1.tar.gz"

[requires]
functions = ["MEDfileOpen"]
includes = ["med.h"]
libraries = [["libmed.a"]]

[capabilities]
needs_math = true
needs_mpi = true

[dependencies]
packages = ["mpi", "hdf5", "mathlib"]

[build]
configure_args = ["--disable-python", "--with-hdf5={dep:hdf5}"]
bootstrap = { script = "./bootstrap", tools = ["libtoolize", "autoreconf"] }
"#;

    #[test]
    fn test_parse_full_descriptor() {
        let desc = PackageDescriptor::parse(MED).unwrap();
        assert_eq!(desc.name(), "med");
        assert_eq!(desc.name().config_key(), "MED");
        assert_eq!(desc.sources.len(), 2);
        assert!(matches!(
            &desc.sources[0],
            SourceLocation::Git { commit: Some(c), .. } if c.starts_with("643c")
        ));
        assert_eq!(desc.requires.includes, vec!["med.h"]);
        assert_eq!(desc.capabilities.precisions, vec![Precision::Double]);
        assert!(!desc.capabilities.complex);
        assert_eq!(desc.deps().len(), 3);
        assert_eq!(desc.build.system, BuildSystem::Gnu);
        let bootstrap = desc.build.bootstrap.as_ref().unwrap();
        assert_eq!(bootstrap.tools, vec!["libtoolize", "autoreconf"]);
    }

    #[test]
    fn test_minimal_descriptor_defaults() {
        let desc = PackageDescriptor::parse("[package]\nname = \"mathlib\"\n").unwrap();
        assert!(!desc.is_downloadable());
        assert!(desc.deps().is_empty());
        assert_eq!(desc.capabilities.precisions, vec![Precision::Double]);
    }

    #[test]
    fn test_rejects_undeclared_placeholder() {
        let toml = r#"
[package]
name = "med"
[build]
configure_args = ["--with-hdf5={dep:hdf5}"]
"#;
        let err = PackageDescriptor::parse(toml).unwrap_err();
        assert!(err.to_string().contains("undeclared dependency 'hdf5'"));
    }

    #[test]
    fn test_rejects_self_dependency() {
        let toml = "[package]\nname = \"a\"\n[dependencies]\npackages = [\"a\"]\n";
        let err = PackageDescriptor::parse(toml).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_rejects_empty_library_combination() {
        let toml = "[package]\nname = \"a\"\n[requires]\nlibraries = [[]]\n";
        assert!(PackageDescriptor::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_unknown_suppressed_key() {
        let toml = "[package]\nname = \"a\"\n[build]\nsuppress_generic = [\"LDFLAGS\"]\n";
        let err = PackageDescriptor::parse(toml).unwrap_err();
        assert!(err.to_string().contains("LDFLAGS"));
    }

    #[test]
    fn test_dep_placeholders() {
        assert_eq!(dep_placeholders("--with-hdf5={dep:hdf5}"), vec!["hdf5"]);
        assert_eq!(
            dep_placeholders("--a={dep:x}:{dep:y}"),
            vec!["x", "y"]
        );
        assert!(dep_placeholders("--disable-python").is_empty());
        assert!(dep_placeholders("{dep:unterminated").is_empty());
    }

    #[test]
    fn test_source_display() {
        let git = SourceLocation::Git {
            url: "https://example.com/x.git".into(),
            commit: Some("abc".into()),
        };
        assert_eq!(git.to_string(), "git:https://example.com/x.git@abc");
        let archive = SourceLocation::Archive {
            url: "https://example.com/x.tar.gz".into(),
            sha256: None,
        };
        assert_eq!(archive.to_string(), "https://example.com/x.tar.gz");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("med.toml");
        std::fs::write(&path, MED).unwrap();
        let desc = PackageDescriptor::from_file(&path).unwrap();
        assert_eq!(desc.name(), "med");

        let missing = PackageDescriptor::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(DescriptorError::Io { .. })));
    }
}
