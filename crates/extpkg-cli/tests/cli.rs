//! End-to-end tests for the extpkg CLI binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test context with a scratch registry and install prefix
struct TestContext {
    _temp_dir: TempDir,
    registry: PathBuf,
    prefix: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let registry = temp_dir.path().join("registry");
        let prefix = temp_dir.path().join("prefix");
        std::fs::create_dir_all(&registry).expect("failed to create registry");

        Self {
            _temp_dir: temp_dir,
            registry,
            prefix,
        }
    }

    fn with_descriptor(self, name: &str, body: &str) -> Self {
        let content = format!("[package]\nname = \"{name}\"\n{body}");
        std::fs::write(self.registry.join(format!("{name}.toml")), content)
            .expect("failed to write descriptor");
        self
    }

    fn extpkg_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_extpkg");
        let mut cmd = Command::new(bin_path);
        cmd.env("EXTPKG_REGISTRY", &self.registry);
        cmd.env("EXTPKG_PREFIX", &self.prefix);
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.extpkg_cmd()
            .args(args)
            .output()
            .expect("failed to run extpkg")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const ANY_PRECISION: &str = "[capabilities]\nprecisions = [\"single\", \"double\"]\n";

fn med_registry() -> TestContext {
    TestContext::new()
        .with_descriptor("mathlib", ANY_PRECISION)
        .with_descriptor("mpi", ANY_PRECISION)
        .with_descriptor(
            "hdf5",
            &format!("{ANY_PRECISION}[dependencies]\npackages = [\"mpi\", \"mathlib\"]\n"),
        )
        .with_descriptor(
            "med",
            r#"
[[sources]]
kind = "archive"
url = "http://127.0.0.1:9/med-3.3.1.tar.gz"

[requires]
includes = ["med.h"]

[capabilities]
precisions = ["double"]

[dependencies]
packages = ["mpi", "hdf5", "mathlib"]
"#,
        )
}

fn is_empty_or_missing(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

fn saved_report(ctx: &TestContext) -> serde_json::Value {
    let report = std::fs::read_to_string(ctx.prefix.join("extpkg-report.json"))
        .expect("report should be written");
    serde_json::from_str(&report).expect("valid JSON")
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
}

#[test]
fn test_list_shows_packages() {
    let ctx = med_registry();
    let output = ctx.run(&["list"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    for name in ["hdf5", "mathlib", "med", "mpi"] {
        assert!(out.contains(name), "missing {name} in:\n{out}");
    }
}

#[test]
fn test_list_empty_registry() {
    let ctx = TestContext::new();
    let output = ctx.run(&["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No package descriptors"));
}

#[test]
fn test_check_prints_dependency_first_order() {
    let ctx = med_registry();
    let output = ctx.run(&["check", "med"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    let pos = |name: &str| {
        out.find(name)
            .unwrap_or_else(|| panic!("{name} not in:\n{out}"))
    };
    assert!(pos("mpi") < pos("hdf5"));
    assert!(pos("mathlib") < pos("hdf5"));
    assert!(pos("hdf5") < pos("med"));
    assert!(out.contains("descriptors valid"));
}

#[test]
fn test_check_rejects_cycle() {
    let ctx = TestContext::new()
        .with_descriptor("a", "[dependencies]\npackages = [\"b\"]\n")
        .with_descriptor("b", "[dependencies]\npackages = [\"a\"]\n");
    let output = ctx.run(&["check"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Circular dependency"));
}

#[test]
fn test_check_rejects_dangling_dependency() {
    let ctx = TestContext::new().with_descriptor("a", "[dependencies]\npackages = [\"ghost\"]\n");
    let output = ctx.run(&["check"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("ghost"));
}

#[test]
fn test_configure_rejects_unsupported_precision_before_download() {
    let ctx = med_registry();
    let output = ctx.run(&[
        "configure",
        "--",
        "--download-med",
        "--with-precision=single",
    ]);
    assert!(!output.status.success());

    let err = stderr(&output);
    assert!(err.contains("single precision"), "stderr: {err}");
    assert!(is_empty_or_missing(&ctx.prefix.join("externalpackages")));

    // The report is still written, naming the failed package.
    let json = saved_report(&ctx);
    let failed: Vec<_> = json["packages"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["status"] == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["name"], "med");
    assert_eq!(failed[0]["error"]["kind"], "constraint violation");
}

#[test]
fn test_configure_json_reports_found_package() {
    let ctx = TestContext::new().with_descriptor("noop", "");
    let output = ctx.run(&["configure", "--json", "--", "--with-noop"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid JSON");
    let packages = json["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0]["name"], "noop");
    assert_eq!(packages[0]["status"], "found");
    assert!(ctx.prefix.join("extpkg-report.json").exists());
}

#[test]
fn test_configure_rejects_invalid_option() {
    let ctx = med_registry();
    let output = ctx.run(&["configure", "--", "--with-precision=half"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid option"));

    let json = saved_report(&ctx);
    assert_eq!(json["error"]["kind"], "invalid option");
    assert!(json["packages"].as_array().unwrap().is_empty());
}

#[test]
fn test_configure_unknown_package() {
    let ctx = med_registry();
    let output = ctx.run(&["configure", "--", "--with-petsc4py"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown package 'petsc4py'"));

    let json = saved_report(&ctx);
    assert_eq!(json["packages"][0]["name"], "petsc4py");
    assert_eq!(json["packages"][0]["error"]["kind"], "unknown package");
}

#[test]
fn test_configure_mpi_stub_rejects_med() {
    let ctx = TestContext::new()
        .with_descriptor("mpi", "")
        .with_descriptor(
            "med",
            "[capabilities]\nneeds_mpi = true\n[dependencies]\npackages = [\"mpi\"]\n",
        );
    let output = ctx.run(&["configure", "--", "--with-mpi=0", "--download-med"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("MPI stub"), "stderr: {}", stderr(&output));

    let json = saved_report(&ctx);
    assert_eq!(json["packages"][0]["name"], "med");
    assert_eq!(json["packages"][0]["error"]["kind"], "constraint violation");
}

#[test]
fn test_configure_reads_config_file() {
    let ctx = TestContext::new().with_descriptor("noop", "");
    let config = ctx.registry.parent().unwrap().join("extpkg.toml");
    std::fs::write(&config, "options = [\"--with-noop\"]\n").unwrap();

    let output = ctx.run(&["configure", "--json", "-c", config.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["packages"][0]["name"], "noop");
}
