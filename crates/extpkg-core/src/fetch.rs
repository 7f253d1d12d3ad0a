//! Source acquisition.
//!
//! Each [`SourceLocation`] variant has one acquisition mechanism: a git clone,
//! an HTTP tarball, or a copy of a local tree. The install pipeline walks a
//! package's locations in order and keeps the first that yields a source tree.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use extpkg_schema::SourceLocation;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use crate::process::{CommandSpec, ProcessRunner};

/// User Agent string for archive downloads
pub const USER_AGENT: &str = concat!("extpkg/", env!("CARGO_PKG_VERSION"));

/// One failed acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    /// Location that was tried.
    pub location: SourceLocation,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for FetchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.reason)
    }
}

/// Obtains a source tree from one location.
pub trait Fetcher {
    /// Populate `dest` (which does not exist yet) from `location`.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the location could not be used.
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<()>;
}

/// Default [`Fetcher`] covering every [`SourceLocation`] variant.
#[derive(Debug)]
pub struct SourceFetcher<R> {
    runner: R,
    client: reqwest::blocking::Client,
}

impl<R: ProcessRunner> SourceFetcher<R> {
    /// Create a fetcher running `git` through `runner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(runner: R) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { runner, client })
    }

    fn fetch_git(&self, url: &str, commit: Option<&str>, dest: &Path) -> Result<()> {
        if !self.runner.has_tool("git") {
            bail!("git not found");
        }
        let clone = CommandSpec::new("git")
            .arg("clone")
            .arg(url)
            .arg(dest.to_string_lossy());
        let out = self.runner.run(&clone)?;
        if !out.success() {
            bail!("git clone failed: {}", out.output.trim());
        }

        if let Some(commit) = commit {
            let checkout = CommandSpec::new("git")
                .arg("-c")
                .arg("advice.detachedHead=false")
                .arg("checkout")
                .arg(commit)
                .cwd(dest);
            let out = self.runner.run(&checkout)?;
            if !out.success() {
                bail!("git checkout {commit} failed: {}", out.output.trim());
            }
        }
        Ok(())
    }

    fn fetch_archive(&self, url: &str, sha256: Option<&str>, dest: &Path) -> Result<()> {
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("download of {url} failed"))?
            .bytes()
            .with_context(|| format!("reading {url} failed"))?;

        if let Some(expected) = sha256 {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                bail!("Hash mismatch: expected {expected}, got {actual}");
            }
        }

        unpack_tarball(&bytes, dest)
    }
}

impl<R: ProcessRunner> Fetcher for SourceFetcher<R> {
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<()> {
        match location {
            SourceLocation::Git { url, commit } => self.fetch_git(url, commit.as_deref(), dest),
            SourceLocation::Archive { url, sha256 } => {
                self.fetch_archive(url, sha256.as_deref(), dest)
            }
            SourceLocation::Local { path } => copy_local(path, dest),
        }
    }
}

/// Extract a gzip tarball into `dest`.
///
/// Tarballs almost always wrap their contents in one top-level directory
/// (`med-3.3.1/`); that directory becomes `dest` itself.
///
/// # Errors
///
/// Returns an error if the data is not a gzip tarball or cannot be written.
pub fn unpack_tarball(bytes: &[u8], dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .context("destination has no parent directory")?;
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)?;

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .unpack(staging.path())
        .context("not a readable gzip tarball")?;

    let entries: Vec<walkdir::DirEntry> = walkdir::WalkDir::new(staging.path())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .collect();

    let root = match entries.as_slice() {
        [single] if single.file_type().is_dir() => single.path().to_path_buf(),
        _ => staging.path().to_path_buf(),
    };
    std::fs::rename(&root, dest)
        .with_context(|| format!("could not move extracted tree to {}", dest.display()))?;
    Ok(())
}

/// Recursively copy a local source tree into `dest`.
///
/// # Errors
///
/// Returns an error if `src` is not a directory or the copy fails.
pub fn copy_local(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        bail!("{} is not a directory", src.display());
    }
    std::fs::create_dir_all(dest)?;
    fs_extra::dir::copy(
        src,
        dest,
        &fs_extra::dir::CopyOptions::new()
            .content_only(true)
            .overwrite(true),
    )
    .map_err(|e| anyhow::anyhow!("Copy failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemRunner;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_collapses_single_top_level_dir() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("med");
        let data = tarball(&[
            ("med-3.3.1/configure", "#!/bin/sh\n"),
            ("med-3.3.1/include/med.h", "int x;\n"),
        ]);
        unpack_tarball(&data, &dest).unwrap();
        assert!(dest.join("configure").is_file());
        assert!(dest.join("include/med.h").is_file());
    }

    #[test]
    fn test_unpack_keeps_flat_archives() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("flat");
        let data = tarball(&[("configure", "x"), ("Makefile.in", "y")]);
        unpack_tarball(&data, &dest).unwrap();
        assert!(dest.join("configure").is_file());
        assert!(dest.join("Makefile.in").is_file());
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let dir = tempdir().unwrap();
        let err = unpack_tarball(b"<html>not found</html>", &dir.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("gzip tarball"));
    }

    #[test]
    fn test_archive_fetch_from_mirror() {
        let mut server = mockito::Server::new();
        let data = tarball(&[("hdf5-1.14/configure", "#!/bin/sh\n")]);
        let digest = hex::encode(Sha256::digest(&data));
        let mock = server
            .mock("GET", "/hdf5-1.14.tar.gz")
            .with_status(200)
            .with_body(data)
            .create();

        let fetcher = SourceFetcher::new(SystemRunner).unwrap();
        let dir = tempdir().unwrap();
        let dest = dir.path().join("hdf5");
        let location = SourceLocation::Archive {
            url: format!("{}/hdf5-1.14.tar.gz", server.url()),
            sha256: Some(digest),
        };
        fetcher.fetch(&location, &dest).unwrap();
        mock.assert();
        assert!(dest.join("configure").is_file());
    }

    #[test]
    fn test_archive_fetch_reports_http_error() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/gone.tar.gz").with_status(404).create();

        let fetcher = SourceFetcher::new(SystemRunner).unwrap();
        let dir = tempdir().unwrap();
        let location = SourceLocation::Archive {
            url: format!("{}/gone.tar.gz", server.url()),
            sha256: None,
        };
        let err = fetcher
            .fetch(&location, &dir.path().join("gone"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("404"));
    }

    #[test]
    fn test_archive_fetch_rejects_hash_mismatch() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/pkg.tar.gz")
            .with_status(200)
            .with_body(tarball(&[("pkg/configure", "x")]))
            .create();

        let fetcher = SourceFetcher::new(SystemRunner).unwrap();
        let dir = tempdir().unwrap();
        let location = SourceLocation::Archive {
            url: format!("{}/pkg.tar.gz", server.url()),
            sha256: Some("0".repeat(64)),
        };
        let err = fetcher
            .fetch(&location, &dir.path().join("pkg"))
            .unwrap_err();
        assert!(err.to_string().contains("Hash mismatch"));
        assert!(!dir.path().join("pkg").exists());
    }

    #[test]
    fn test_local_copy() {
        let src = tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("src")).unwrap();
        std::fs::write(src.path().join("configure"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.path().join("src/a.c"), "int a;\n").unwrap();

        let out = tempdir().unwrap();
        let dest = out.path().join("pkg");
        let location = SourceLocation::Local {
            path: src.path().to_path_buf(),
        };
        SourceFetcher::new(SystemRunner)
            .unwrap()
            .fetch(&location, &dest)
            .unwrap();
        assert!(dest.join("configure").is_file());
        assert!(dest.join("src/a.c").is_file());
    }

    #[test]
    fn test_local_copy_requires_directory() {
        let out = tempdir().unwrap();
        let err = copy_local(Path::new("/nonexistent/extpkg"), &out.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn test_attempt_display() {
        let attempt = FetchAttempt {
            location: SourceLocation::Archive {
                url: "http://mirror/x.tar.gz".into(),
                sha256: None,
            },
            reason: "connection refused".into(),
        };
        assert_eq!(attempt.to_string(), "http://mirror/x.tar.gz (connection refused)");
    }
}
