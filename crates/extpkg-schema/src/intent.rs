//! Per-package user intent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::ParseConfigError;

/// Whether a package should be downloaded and built from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// Never download; the package must be found on the system (default).
    #[default]
    No,
    /// Always download and build, without probing the system first.
    Yes,
    /// Probe the system first and download only when nothing is found.
    IfNeeded,
}

impl FromStr for DownloadMode {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" | "0" | "false" => Ok(Self::No),
            "yes" | "1" | "true" | "" => Ok(Self::Yes),
            "ifneeded" | "if-needed" => Ok(Self::IfNeeded),
            _ => Err(ParseConfigError {
                kind: "download mode",
                value: s.to_string(),
                expected: "no, yes, ifneeded",
            }),
        }
    }
}

/// What the user asked for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIntent {
    /// Explicit opt-in (`--with-<pkg>`).
    pub wanted: bool,
    /// Explicit opt-out (`--with-<pkg>=0`); beats every implicit reason to want it.
    pub disabled: bool,
    /// Root of an existing installation.
    pub dir: Option<PathBuf>,
    /// Explicit include directories.
    pub include: Vec<PathBuf>,
    /// Explicit library files.
    pub lib: Vec<PathBuf>,
    /// Download request.
    pub download: DownloadMode,
}

impl PackageIntent {
    /// Whether anything the user said implies the package is wanted.
    ///
    /// An install directory, explicit include/lib paths or a download request
    /// all count as opting in.
    pub fn is_wanted(&self) -> bool {
        self.wanted || self.has_explicit_location() || self.download != DownloadMode::No
    }

    /// Whether explicit locations were given instead of relying on search.
    pub fn has_explicit_location(&self) -> bool {
        self.dir.is_some() || !self.include.is_empty() || !self.lib.is_empty()
    }
}
