//! Compatibility checks between a descriptor and the build configuration.
//!
//! These are compiled-in limitations of the third-party code. They are checked
//! before any download or build so that a doomed configuration fails fast and
//! with a named reason.

use extpkg_schema::{
    BuildConfig, IndexWidth, PackageDescriptor, ParallelRuntime, Precision, ScalarType,
};
use thiserror::Error;

/// One violated capability constraint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// Needs a real parallel runtime, but the stub is configured.
    #[error("it requires a real MPI, but the configuration uses the MPI stub")]
    StubRuntime,

    /// 64-bit indices requested for a 32-bit-only package.
    #[error("it is not coded for 64-bit integers")]
    ExtendedIndices,

    /// The active precision is not in the declared set.
    #[error("it does not support {active} precision (supported: {})", list(.supported))]
    UnsupportedPrecision {
        /// Configured precision.
        active: Precision,
        /// Precisions the package declares.
        supported: Vec<Precision>,
    },

    /// Complex scalars requested for a real-only package.
    #[error("it is not coded for complex numbers")]
    ComplexScalars,
}

fn list(precisions: &[Precision]) -> String {
    precisions
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check whether `descriptor` may be used under `config`.
///
/// Constraints are evaluated in a fixed order and the first violation wins.
/// A precision outside the declared set is always a violation; there is no
/// fallback to a neighbouring precision.
///
/// # Errors
///
/// Returns the first [`ConstraintViolation`] found.
pub fn check_compatibility(
    descriptor: &PackageDescriptor,
    config: &BuildConfig,
) -> Result<(), ConstraintViolation> {
    let caps = &descriptor.capabilities;

    if caps.needs_mpi && config.runtime == ParallelRuntime::Stub {
        return Err(ConstraintViolation::StubRuntime);
    }
    if config.index_width == IndexWidth::Extended && !caps.index64 {
        return Err(ConstraintViolation::ExtendedIndices);
    }
    if !caps.precisions.contains(&config.precision) {
        return Err(ConstraintViolation::UnsupportedPrecision {
            active: config.precision,
            supported: caps.precisions.clone(),
        });
    }
    if config.scalar == ScalarType::Complex && !caps.complex {
        return Err(ConstraintViolation::ComplexScalars);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(caps: &str) -> PackageDescriptor {
        PackageDescriptor::parse(&format!(
            "[package]\nname = \"pkg\"\n[capabilities]\n{caps}\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_default_config_allows_default_package() {
        let desc = descriptor("");
        assert!(check_compatibility(&desc, &BuildConfig::default()).is_ok());
    }

    #[test]
    fn test_stub_runtime_rejected_when_mpi_needed() {
        let desc = descriptor("needs_mpi = true");
        let config = BuildConfig {
            runtime: ParallelRuntime::Stub,
            ..Default::default()
        };
        assert_eq!(
            check_compatibility(&desc, &config),
            Err(ConstraintViolation::StubRuntime)
        );

        let serial = descriptor("");
        assert!(check_compatibility(&serial, &config).is_ok());
    }

    #[test]
    fn test_extended_indices() {
        let config = BuildConfig {
            index_width: IndexWidth::Extended,
            ..Default::default()
        };
        assert_eq!(
            check_compatibility(&descriptor(""), &config),
            Err(ConstraintViolation::ExtendedIndices)
        );
        assert!(check_compatibility(&descriptor("index64 = true"), &config).is_ok());
    }

    #[test]
    fn test_double_only_rejects_single_and_quad() {
        let desc = descriptor("precisions = [\"double\"]");
        for precision in [Precision::Single, Precision::Quad] {
            let config = BuildConfig {
                precision,
                ..Default::default()
            };
            let err = check_compatibility(&desc, &config).unwrap_err();
            assert!(matches!(
                err,
                ConstraintViolation::UnsupportedPrecision { active, .. } if active == precision
            ));
        }
    }

    #[test]
    fn test_multi_precision_package() {
        let desc = descriptor("precisions = [\"single\", \"double\"]");
        let config = BuildConfig {
            precision: Precision::Single,
            ..Default::default()
        };
        assert!(check_compatibility(&desc, &config).is_ok());
    }

    #[test]
    fn test_complex_requires_opt_in() {
        let config = BuildConfig {
            scalar: ScalarType::Complex,
            ..Default::default()
        };
        assert_eq!(
            check_compatibility(&descriptor(""), &config),
            Err(ConstraintViolation::ComplexScalars)
        );
        assert!(check_compatibility(&descriptor("complex = true"), &config).is_ok());
    }

    #[test]
    fn test_first_violation_wins() {
        let desc = descriptor("needs_mpi = true");
        let config = BuildConfig {
            runtime: ParallelRuntime::Stub,
            scalar: ScalarType::Complex,
            precision: Precision::Single,
            ..Default::default()
        };
        assert_eq!(
            check_compatibility(&desc, &config),
            Err(ConstraintViolation::StubRuntime)
        );
    }

    #[test]
    fn test_messages_name_the_constraint() {
        let err = ConstraintViolation::UnsupportedPrecision {
            active: Precision::Single,
            supported: vec![Precision::Double],
        };
        assert_eq!(
            err.to_string(),
            "it does not support single precision (supported: double)"
        );
    }
}
