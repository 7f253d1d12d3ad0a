//! Command-line style configure options.
//!
//! | Option | Effect |
//! |---|---|
//! | `--with-<pkg>[=0\|1]` | want (or refuse) a package |
//! | `--with-<pkg>-dir=<path>` | use an existing installation root |
//! | `--with-<pkg>-include=<dirs>` | explicit include directories |
//! | `--with-<pkg>-lib=<files>` | explicit library files |
//! | `--download-<pkg>[=no\|yes\|ifneeded]` | build from source |
//! | `--with-precision=<single\|double\|quad>` | scalar precision |
//! | `--with-scalar-type=<real\|complex>` | scalar domain |
//! | `--with-64-bit-indices[=0\|1]` | index width |
//! | `--with-mpi=0` | use the MPI stub, which then stands in for the `mpi` package |
//! | `--with-cc=`, `--with-cxx=`, `--with-fc=` | compilers |
//! | `CC=`, `CXX=`, `FC=`, `CFLAGS=` | compilers and flags |
//! | `--prefix=<path>` | shared install prefix |
//! | `--jobs=<n>` | parallel build jobs |
//!
//! List values (`-include`, `-lib`) accept `a,b`, `[a,b]` or space separated
//! paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use extpkg_schema::{BuildConfig, IndexWidth, PackageIntent, PackageName, ParallelRuntime};
use regex::Regex;
use serde::Deserialize;

use crate::error::{ConfigureError, Result};

/// User intent per package, keyed by name.
pub type Intents = BTreeMap<PackageName, PackageIntent>;

/// `with-<pkg>`, `with-<pkg>-dir|include|lib` and `download-<pkg>`.
static PACKAGE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(with|download)-([a-z0-9][a-z0-9_-]*?)(?:-(dir|include|lib))?$")
        .expect("package option pattern is valid")
});

/// Everything a configure run was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    /// Global settings (precision, scalar type, compilers, ...).
    pub build: BuildConfig,
    /// Per-package requests.
    pub intents: Intents,
    /// Shared install prefix, when given.
    pub prefix: Option<PathBuf>,
    /// Directory holding the package descriptors.
    pub registry: Option<PathBuf>,
}

/// On-disk form of a saved configuration.
///
/// ```toml
/// prefix = "arch-linux-opt"
/// registry = "registry"
/// options = ["--with-scalar-type=complex", "--download-hdf5"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    #[serde(default)]
    options: Vec<String>,
    prefix: Option<PathBuf>,
    registry: Option<PathBuf>,
}

impl ConfigureOptions {
    /// Parse a list of options, later options overriding earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::InvalidOption`] for the first option that is
    /// not recognised or carries a bad value.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        options.extend(args)?;
        Ok(options)
    }

    /// Read a saved configuration file.
    ///
    /// Relative `prefix` and `registry` paths are taken relative to the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::InvalidConfigFile`] if the file cannot be
    /// read or parsed, or the first invalid option it lists.
    pub fn from_file(path: &Path) -> Result<Self> {
        let invalid = |reason: String| ConfigureError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let file: OptionsFile = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut options = Self::parse(&file.options)?;
        if let Some(prefix) = file.prefix {
            options.prefix = Some(base.join(prefix));
        }
        if let Some(registry) = file.registry {
            options.registry = Some(base.join(registry));
        }
        tracing::debug!("loaded {} options from {}", file.options.len(), path.display());
        Ok(options)
    }

    /// Apply more options on top of the current ones.
    ///
    /// # Errors
    ///
    /// Returns the first invalid option.
    pub fn extend<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.apply(arg.as_ref())?;
        }
        Ok(())
    }

    /// Apply a single option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::InvalidOption`] if `arg` is not recognised.
    pub fn apply(&mut self, arg: &str) -> Result<()> {
        let arg = arg.trim();
        let Some(body) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
            return self.apply_variable(arg);
        };
        let (key, value) = match body.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (body, None),
        };

        match key {
            "prefix" => self.prefix = Some(PathBuf::from(required(arg, value)?)),
            "jobs" => {
                let jobs: usize = required(arg, value)?
                    .parse()
                    .map_err(|e| ConfigureError::invalid_option(arg, e))?;
                if jobs == 0 {
                    return Err(ConfigureError::invalid_option(arg, "must be at least 1"));
                }
                self.build.jobs = Some(jobs);
            }
            "with-precision" => {
                self.build.precision = required(arg, value)?
                    .parse()
                    .map_err(|e| ConfigureError::invalid_option(arg, e))?;
            }
            "with-scalar-type" => {
                self.build.scalar = required(arg, value)?
                    .parse()
                    .map_err(|e| ConfigureError::invalid_option(arg, e))?;
            }
            "with-64-bit-indices" => {
                self.build.index_width = if flag(arg, value)? {
                    IndexWidth::Extended
                } else {
                    IndexWidth::Standard
                };
            }
            "with-cc" => self.build.toolchain.cc = required(arg, value)?.to_string(),
            "with-cxx" => self.build.toolchain.cxx = required(arg, value)?.to_string(),
            "with-fc" => {
                let fc = required(arg, value)?;
                self.build.toolchain.fc = match fc {
                    "0" | "no" | "false" => None,
                    _ => Some(fc.to_string()),
                };
            }
            _ => self.apply_package_option(arg, &key.to_ascii_lowercase(), value)?,
        }
        Ok(())
    }

    /// `KEY=VALUE` forms without leading dashes.
    fn apply_variable(&mut self, arg: &str) -> Result<()> {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(ConfigureError::invalid_option(arg, "unrecognized option"));
        };
        let tc = &mut self.build.toolchain;
        match key {
            "CC" => tc.cc = value.to_string(),
            "CXX" => tc.cxx = value.to_string(),
            "FC" => tc.fc = Some(value.to_string()).filter(|v| !v.is_empty()),
            "CFLAGS" => tc.cflags = Some(value.to_string()).filter(|v| !v.is_empty()),
            _ => return Err(ConfigureError::invalid_option(arg, "unrecognized option")),
        }
        Ok(())
    }

    fn apply_package_option(&mut self, arg: &str, key: &str, value: Option<&str>) -> Result<()> {
        let Some(caps) = PACKAGE_OPTION.captures(key) else {
            return Err(ConfigureError::invalid_option(arg, "unrecognized option"));
        };
        let name = PackageName::new(&caps[2]);
        let suffix = caps.get(3).map(|m| m.as_str());

        match (&caps[1], suffix) {
            ("with", None) => {
                let on = flag(arg, value)?;
                if name == ParallelRuntime::PACKAGE {
                    // The stub still provides `mpi` to dependents, so
                    // `--with-mpi=0` selects it instead of refusing the package.
                    if !on {
                        self.build.runtime = ParallelRuntime::Stub;
                        self.intents.remove(&name);
                        return Ok(());
                    }
                    self.build.runtime = ParallelRuntime::Real;
                }
                let intent = self.intents.entry(name).or_default();
                intent.wanted = on;
                intent.disabled = !on;
            }
            ("with", Some("dir")) => {
                let dir = PathBuf::from(required(arg, value)?);
                self.intents.entry(name).or_default().dir = Some(dir);
            }
            ("with", Some("include")) => {
                let dirs = split_list(required(arg, value)?);
                self.intents.entry(name).or_default().include.extend(dirs);
            }
            ("with", Some("lib")) => {
                let libs = split_list(required(arg, value)?);
                self.intents.entry(name).or_default().lib.extend(libs);
            }
            ("download", None) => {
                let mode = value
                    .unwrap_or("")
                    .parse()
                    .map_err(|e| ConfigureError::invalid_option(arg, e))?;
                self.intents.entry(name).or_default().download = mode;
            }
            _ => return Err(ConfigureError::invalid_option(arg, "unrecognized option")),
        }
        Ok(())
    }

    /// Packages the user opted into, in name order.
    pub fn roots(&self) -> Vec<PackageName> {
        self.intents
            .iter()
            .filter(|(_, intent)| intent.is_wanted() && !intent.disabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn required<'v>(arg: &str, value: Option<&'v str>) -> Result<&'v str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigureError::invalid_option(arg, "a value is required")),
    }
}

fn flag(arg: &str, value: Option<&str>) -> Result<bool> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("1" | "yes" | "true") => Ok(true),
        Some("0" | "no" | "false") => Ok(false),
        Some(_) => Err(ConfigureError::invalid_option(arg, "expected 0 or 1")),
    }
}

fn split_list(value: &str) -> Vec<PathBuf> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
