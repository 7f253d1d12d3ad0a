//! Package identity.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Lowercase identifier of an external package (`hdf5`, `superlu-dist`).
///
/// Option names and registry file names use this spelling. The upper-case
/// form build systems expect (`HDF5`, `SUPERLU_DIST`) comes from
/// [`Self::config_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Lowercases `name`; `HDF5` and `hdf5` are the same package.
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-case configuration key (`superlu-dist` becomes `SUPERLU_DIST`).
    pub fn config_key(&self) -> String {
        self.0.to_uppercase().replace(['-', '.'], "_")
    }

    /// Whether the name only uses the characters allowed in option names.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

// Lets `BTreeMap<PackageName, _>` and `HashSet<PackageName>` be queried
// with a plain `&str`.
impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Comparisons against literals are case-insensitive, like option parsing.
impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl From<&str> for PackageName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PackageName {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}
