//! Ambient build configuration.
//!
//! A [`BuildConfig`] is established once, before any package is resolved, and
//! is only ever read afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a configuration value cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseConfigError {
    /// Which setting was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Accepted spellings.
    pub expected: &'static str,
}

/// Floating point precision of the scalars the code base is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floats.
    Single,
    /// 64-bit floats (default).
    #[default]
    Double,
    /// 128-bit floats.
    Quad,
}

impl Precision {
    /// Canonical lowercase spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Quad => "quad",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "double" => Ok(Self::Double),
            "quad" | "__float128" => Ok(Self::Quad),
            _ => Err(ParseConfigError {
                kind: "precision",
                value: s.to_string(),
                expected: "single, double, quad",
            }),
        }
    }
}

/// Scalar domain: real or complex numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Real scalars (default).
    #[default]
    Real,
    /// Complex scalars.
    Complex,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Real => "real",
            Self::Complex => "complex",
        })
    }
}

impl FromStr for ScalarType {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "real" => Ok(Self::Real),
            "complex" => Ok(Self::Complex),
            _ => Err(ParseConfigError {
                kind: "scalar type",
                value: s.to_string(),
                expected: "real, complex",
            }),
        }
    }
}

/// Width of the integer type used for indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexWidth {
    /// 32-bit indices (default).
    #[default]
    Standard,
    /// 64-bit indices.
    Extended,
}

/// Whether the parallel runtime is a real implementation or the no-op stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParallelRuntime {
    /// A real message-passing implementation (default).
    #[default]
    Real,
    /// The single-process stub that turns every call into a no-op.
    Stub,
}

impl ParallelRuntime {
    /// Registry name of the package providing the real runtime. Under the
    /// stub this package is satisfied without probing.
    pub const PACKAGE: &'static str = "mpi";
}

/// Compilers and flags forwarded to every package's configure step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    /// C compiler.
    pub cc: String,
    /// C++ compiler.
    pub cxx: String,
    /// Fortran compiler, when one is configured.
    #[serde(default)]
    pub fc: Option<String>,
    /// Extra C compiler flags.
    #[serde(default)]
    pub cflags: Option<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cc: "cc".to_string(),
            cxx: "c++".to_string(),
            fc: None,
            cflags: None,
        }
    }
}

/// Process-wide build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Active scalar precision.
    pub precision: Precision,
    /// Active scalar domain.
    pub scalar: ScalarType,
    /// Index integer width.
    pub index_width: IndexWidth,
    /// Parallel runtime flavour.
    pub runtime: ParallelRuntime,
    /// Compilers used for probes and native builds.
    pub toolchain: Toolchain,
    /// Parallel build jobs; `None` means one per logical CPU.
    pub jobs: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_parse() {
        assert_eq!("single".parse::<Precision>().unwrap(), Precision::Single);
        assert_eq!("DOUBLE".parse::<Precision>().unwrap(), Precision::Double);
        assert_eq!("__float128".parse::<Precision>().unwrap(), Precision::Quad);
        let err = "half".parse::<Precision>().unwrap_err();
        assert!(err.to_string().contains("invalid precision 'half'"));
    }

    #[test]
    fn test_scalar_parse() {
        assert_eq!("complex".parse::<ScalarType>().unwrap(), ScalarType::Complex);
        assert!("quaternion".parse::<ScalarType>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = BuildConfig::default();
        assert_eq!(config.precision, Precision::Double);
        assert_eq!(config.scalar, ScalarType::Real);
        assert_eq!(config.index_width, IndexWidth::Standard);
        assert_eq!(config.runtime, ParallelRuntime::Real);
        assert_eq!(config.toolchain.cc, "cc");
    }
}
