//! Existence probes: does a header preprocess, does a symbol link, is a
//! library combination present?
//!
//! The [`ProbeOracle`] trait is the seam. [`probe_location`] runs the full
//! requirement check for one candidate location on top of it, and
//! [`CompilerProbe`] answers the individual questions by driving the
//! configured C compiler in a scratch directory.

use std::fmt;
use std::path::{Path, PathBuf};

use extpkg_schema::PackageDescriptor;
use serde::Serialize;

use crate::process::{CommandSpec, ProcessRunner};

/// Libraries and search paths a link test uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    /// Library files linked by full path, in order.
    pub libraries: Vec<PathBuf>,
    /// `-L` directories.
    pub lib_dirs: Vec<PathBuf>,
    /// System libraries linked by name (`m` for `-lm`).
    pub system_libs: Vec<String>,
}

/// Answers availability questions for headers, symbols and libraries.
pub trait ProbeOracle {
    /// Whether `#include <header>` preprocesses with `include_dirs`.
    fn probe_header(&self, header: &str, include_dirs: &[PathBuf]) -> bool;

    /// Whether a program calling `symbol` links against `link`.
    fn probe_symbol(&self, symbol: &str, link: &LinkSet) -> bool;

    /// First combination whose every file is present in `lib_dirs`, as full
    /// paths. An empty `lib_dirs` means the default search path.
    fn probe_library_combination(
        &self,
        candidates: &[Vec<String>],
        lib_dirs: &[PathBuf],
    ) -> Option<Vec<PathBuf>>;
}

/// One place to look for an existing installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCandidate {
    /// Human-readable description used in "searched" lists.
    pub label: String,
    /// Installation root, when the candidate has one.
    pub directory: Option<PathBuf>,
    /// Directories searched for headers.
    pub include_dirs: Vec<PathBuf>,
    /// Directories searched for library combinations.
    pub lib_dirs: Vec<PathBuf>,
    /// Explicit library files; bypass the combination search when non-empty.
    pub libraries: Vec<PathBuf>,
}

impl SearchCandidate {
    /// `<dir>/include` with `<dir>/lib` and `<dir>/lib64`.
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            label: dir.display().to_string(),
            directory: Some(dir.to_path_buf()),
            include_dirs: vec![dir.join("include")],
            lib_dirs: vec![dir.join("lib"), dir.join("lib64")],
            libraries: Vec::new(),
        }
    }

    /// Explicitly given include directories and library files.
    pub fn explicit(include_dirs: &[PathBuf], libraries: &[PathBuf]) -> Self {
        let mut lib_dirs: Vec<PathBuf> = Vec::new();
        for lib in libraries {
            if let Some(parent) = lib.parent() {
                if !lib_dirs.iter().any(|d| d == parent) {
                    lib_dirs.push(parent.to_path_buf());
                }
            }
        }
        Self {
            label: "explicit include/lib options".to_string(),
            directory: None,
            include_dirs: include_dirs.to_vec(),
            lib_dirs,
            libraries: libraries.to_vec(),
        }
    }

    /// The compiler's default search paths.
    pub fn system() -> Self {
        Self {
            label: "default compiler search paths".to_string(),
            ..Default::default()
        }
    }
}

/// Where a package was found or installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedLocation {
    /// Installation root, when known.
    pub directory: Option<PathBuf>,
    /// Include directories dependents compile against.
    pub include_dirs: Vec<PathBuf>,
    /// Matched library files.
    pub libraries: Vec<PathBuf>,
}

/// What a probe could not find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMiss {
    /// Headers not found.
    pub headers: Vec<String>,
    /// Candidate combinations when none was present.
    pub libraries: Option<Vec<Vec<String>>>,
    /// Functions that failed to link.
    pub symbols: Vec<String>,
}

impl ProbeMiss {
    fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.libraries.is_none() && self.symbols.is_empty()
    }
}

impl fmt::Display for ProbeMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.headers.is_empty() {
            parts.push(format!("missing headers: {}", self.headers.join(", ")));
        }
        if let Some(combos) = &self.libraries {
            let combos: Vec<String> = combos.iter().map(|c| c.join(" ")).collect();
            parts.push(format!("no library among: [{}]", combos.join("], [")));
        }
        if !self.symbols.is_empty() {
            parts.push(format!("unresolved symbols: {}", self.symbols.join(", ")));
        }
        if parts.is_empty() {
            return f.write_str("nothing missing");
        }
        f.write_str(&parts.join("; "))
    }
}

/// Run every requirement of `descriptor` against one candidate location.
///
/// `deps` carries the include directories and libraries of the package's
/// already resolved dependencies; they are added to the header search and to
/// the link line of the symbol probes.
///
/// # Errors
///
/// Returns a [`ProbeMiss`] listing every header, library combination and
/// symbol that could not be found. Symbols are only probed once headers and
/// libraries are present.
pub fn probe_location(
    oracle: &dyn ProbeOracle,
    descriptor: &PackageDescriptor,
    candidate: &SearchCandidate,
    deps: &ResolvedLocation,
) -> Result<ResolvedLocation, ProbeMiss> {
    let requires = &descriptor.requires;
    let mut miss = ProbeMiss::default();

    let mut include_dirs = candidate.include_dirs.clone();
    include_dirs.extend(deps.include_dirs.iter().cloned());

    for header in &requires.includes {
        if oracle.probe_header(header, &include_dirs) {
            tracing::debug!("Found header file {header} in {include_dirs:?}");
        } else {
            miss.headers.push(header.clone());
        }
    }

    let libraries = if !candidate.libraries.is_empty() || requires.libraries.is_empty() {
        candidate.libraries.clone()
    } else if let Some(found) =
        oracle.probe_library_combination(&requires.libraries, &candidate.lib_dirs)
    {
        tracing::debug!("Found libraries {found:?} for {}", descriptor.name());
        found
    } else {
        miss.libraries = Some(requires.libraries.clone());
        Vec::new()
    };

    if miss.is_empty() && !requires.functions.is_empty() {
        let mut link = LinkSet {
            libraries: libraries.clone(),
            lib_dirs: candidate.lib_dirs.clone(),
            system_libs: Vec::new(),
        };
        link.libraries.extend(deps.libraries.iter().cloned());
        if descriptor.capabilities.needs_math {
            link.system_libs.push("m".to_string());
        }
        for symbol in &requires.functions {
            if !oracle.probe_symbol(symbol, &link) {
                miss.symbols.push(symbol.clone());
            }
        }
    }

    if !miss.is_empty() {
        return Err(miss);
    }

    Ok(ResolvedLocation {
        directory: candidate.directory.clone(),
        include_dirs: candidate.include_dirs.clone(),
        libraries,
    })
}

/// Library directories searched when no explicit directory is given.
const DEFAULT_LIB_DIRS: &[&str] = &[
    "/usr/local/lib",
    "/usr/lib",
    "/usr/lib64",
    "/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
];

/// [`ProbeOracle`] backed by the C compiler.
#[derive(Debug, Clone)]
pub struct CompilerProbe<R> {
    cc: String,
    runner: R,
    default_lib_dirs: Vec<PathBuf>,
}

impl<R: ProcessRunner> CompilerProbe<R> {
    /// Probe with compiler `cc`, run through `runner`.
    pub fn new(cc: impl Into<String>, runner: R) -> Self {
        Self {
            cc: cc.into(),
            runner,
            default_lib_dirs: DEFAULT_LIB_DIRS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Replace the directories searched when a probe is given none.
    pub fn with_default_lib_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.default_lib_dirs = dirs;
        self
    }

    /// Run the compiler on `source` in a scratch directory.
    ///
    /// `leading` goes before the source file and `trailing` after it, since
    /// libraries must follow the objects that reference them.
    fn run_compiler(&self, source: &str, leading: Vec<String>, trailing: Vec<String>) -> bool {
        let scratch = match tempfile::Builder::new().prefix("extpkg-probe-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("could not create probe directory: {e}");
                return false;
            }
        };
        let file = scratch.path().join("conftest.c");
        if let Err(e) = std::fs::write(&file, source) {
            tracing::warn!("could not write probe source: {e}");
            return false;
        }

        let cmd = CommandSpec::new(&self.cc)
            .args(leading)
            .arg(file.to_string_lossy())
            .args(trailing)
            .cwd(scratch.path());
        match self.runner.run(&cmd) {
            Ok(out) if out.success() => true,
            Ok(out) => {
                tracing::debug!("probe failed: {cmd}\n{}", out.output);
                false
            }
            Err(e) => {
                tracing::debug!("probe could not run {}: {e}", self.cc);
                false
            }
        }
    }
}

impl<R: ProcessRunner> ProbeOracle for CompilerProbe<R> {
    fn probe_header(&self, header: &str, include_dirs: &[PathBuf]) -> bool {
        let mut args = vec!["-E".to_string(), "-o".to_string(), "conftest.i".to_string()];
        args.extend(include_dirs.iter().map(|d| format!("-I{}", d.display())));
        self.run_compiler(&format!("#include <{header}>\n"), args, Vec::new())
    }

    fn probe_symbol(&self, symbol: &str, link: &LinkSet) -> bool {
        let source =
            format!("char {symbol}(void);\nint main(void) {{\n  {symbol}();\n  return 0;\n}}\n");
        let mut trailing: Vec<String> = link
            .lib_dirs
            .iter()
            .map(|d| format!("-L{}", d.display()))
            .collect();
        trailing.extend(link.libraries.iter().map(|l| l.display().to_string()));
        trailing.extend(link.system_libs.iter().map(|l| format!("-l{l}")));
        self.run_compiler(&source, vec!["-o".to_string(), "conftest".to_string()], trailing)
    }

    fn probe_library_combination(
        &self,
        candidates: &[Vec<String>],
        lib_dirs: &[PathBuf],
    ) -> Option<Vec<PathBuf>> {
        let dirs: &[PathBuf] = if lib_dirs.is_empty() {
            &self.default_lib_dirs
        } else {
            lib_dirs
        };
        candidates.iter().find_map(|combo| {
            combo
                .iter()
                .map(|name| {
                    dirs.iter()
                        .map(|dir| dir.join(name))
                        .find(|path| path.is_file())
                })
                .collect::<Option<Vec<PathBuf>>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Oracle answering from fixed sets of present headers/symbols/files.
    #[derive(Default)]
    struct FakeOracle {
        headers: HashSet<String>,
        symbols: HashSet<String>,
        files: HashSet<PathBuf>,
        symbol_links: RefCell<Vec<LinkSet>>,
    }

    impl ProbeOracle for FakeOracle {
        fn probe_header(&self, header: &str, _: &[PathBuf]) -> bool {
            self.headers.contains(header)
        }
        fn probe_symbol(&self, symbol: &str, link: &LinkSet) -> bool {
            self.symbol_links.borrow_mut().push(link.clone());
            self.symbols.contains(symbol)
        }
        fn probe_library_combination(
            &self,
            candidates: &[Vec<String>],
            lib_dirs: &[PathBuf],
        ) -> Option<Vec<PathBuf>> {
            candidates.iter().find_map(|combo| {
                combo
                    .iter()
                    .map(|n| {
                        lib_dirs
                            .iter()
                            .map(|d| d.join(n))
                            .find(|p| self.files.contains(p))
                    })
                    .collect()
            })
        }
    }

    fn med() -> PackageDescriptor {
        PackageDescriptor::parse(
            r#"
[package]
name = "med"
[requires]
functions = ["MEDfileOpen"]
includes = ["med.h"]
libraries = [["libmed.a"], ["libmedC.a", "libmed.a"]]
[capabilities]
needs_math = true
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_probe_location_found() {
        let oracle = FakeOracle {
            headers: ["med.h".to_string()].into(),
            symbols: ["MEDfileOpen".to_string()].into(),
            files: [PathBuf::from("/opt/med/lib/libmed.a")].into(),
            ..Default::default()
        };
        let deps = ResolvedLocation {
            directory: None,
            include_dirs: vec![PathBuf::from("/opt/hdf5/include")],
            libraries: vec![PathBuf::from("/opt/hdf5/lib/libhdf5.a")],
        };
        let candidate = SearchCandidate::from_dir(Path::new("/opt/med"));
        let found = probe_location(&oracle, &med(), &candidate, &deps).unwrap();
        assert_eq!(found.directory, Some(PathBuf::from("/opt/med")));
        assert_eq!(found.libraries, vec![PathBuf::from("/opt/med/lib/libmed.a")]);

        let links = oracle.symbol_links.borrow();
        assert_eq!(links.len(), 1);
        assert!(links[0]
            .libraries
            .contains(&PathBuf::from("/opt/hdf5/lib/libhdf5.a")));
        assert_eq!(links[0].system_libs, vec!["m"]);
    }

    #[test]
    fn test_probe_location_reports_every_miss() {
        let oracle = FakeOracle::default();
        let candidate = SearchCandidate::from_dir(Path::new("/opt/med"));
        let miss = probe_location(&oracle, &med(), &candidate, &ResolvedLocation::default())
            .unwrap_err();
        assert_eq!(miss.headers, vec!["med.h"]);
        assert!(miss.libraries.is_some());
        // Symbols are not probed without headers and libraries.
        assert!(miss.symbols.is_empty());
        assert!(oracle.symbol_links.borrow().is_empty());
        let msg = miss.to_string();
        assert!(msg.contains("missing headers: med.h"));
        assert!(msg.contains("[libmedC.a libmed.a]"));
    }

    #[test]
    fn test_explicit_libraries_bypass_search() {
        let oracle = FakeOracle {
            headers: ["med.h".to_string()].into(),
            symbols: ["MEDfileOpen".to_string()].into(),
            ..Default::default()
        };
        let candidate = SearchCandidate::explicit(
            &[PathBuf::from("/x/include")],
            &[PathBuf::from("/x/lib/libmed.so")],
        );
        assert_eq!(candidate.lib_dirs, vec![PathBuf::from("/x/lib")]);
        let found =
            probe_location(&oracle, &med(), &candidate, &ResolvedLocation::default()).unwrap();
        assert_eq!(found.libraries, vec![PathBuf::from("/x/lib/libmed.so")]);
        assert_eq!(found.directory, None);
    }

    #[test]
    fn test_compiler_probe_library_combination_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libmedC.a"), "").unwrap();
        std::fs::write(dir.path().join("libmed.a"), "").unwrap();
        let probe = CompilerProbe::new("cc", crate::process::SystemRunner);
        let combos = vec![
            vec!["libmissing.a".to_string()],
            vec!["libmedC.a".to_string(), "libmed.a".to_string()],
        ];
        let found = probe
            .probe_library_combination(&combos, &[dir.path().to_path_buf()])
            .unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("libmedC.a"), dir.path().join("libmed.a")]
        );
        assert!(probe
            .probe_library_combination(&[vec!["libnope.a".to_string()]], &[dir
                .path()
                .to_path_buf()])
            .is_none());
    }

    #[test]
    fn test_compiler_probe_uses_default_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libz.a"), "").unwrap();
        let probe = CompilerProbe::new("cc", crate::process::SystemRunner)
            .with_default_lib_dirs(vec![dir.path().to_path_buf()]);
        let found = probe.probe_library_combination(&[vec!["libz.a".to_string()]], &[]);
        assert_eq!(found, Some(vec![dir.path().join("libz.a")]));
    }
}
