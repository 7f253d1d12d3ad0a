//! External process execution.
//!
//! Bootstrap, configure, build and install steps are long-running blocking
//! calls. The core only observes the exit status and the captured output.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Number of trailing log lines attached to a failure.
pub const LOG_TAIL_LINES: usize = 40;

/// A command to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory; inherited when unset.
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
    /// File receiving stdout and stderr; captured in memory when unset.
    pub log: Option<PathBuf>,
}

impl CommandSpec {
    /// Command running `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// `/bin/sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir`.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Send output to a log file instead of capturing it.
    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    /// Combined stdout and stderr (the log tail when a log file was used).
    pub output: String,
    /// Log file holding the full output, if any.
    pub log: Option<PathBuf>,
}

impl ProcessOutput {
    /// Exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands on behalf of the pipeline and the probes.
pub trait ProcessRunner {
    /// Run `cmd` to completion.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only when the process could not be started or its
    /// output could not be collected. A non-zero exit is not an error here.
    fn run(&self, cmd: &CommandSpec) -> std::io::Result<ProcessOutput>;

    /// Whether `tool` can be found on `PATH`.
    fn has_tool(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<ProcessOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        tracing::debug!("running: {spec}");

        let Some(log_path) = &spec.log else {
            let out = cmd.output()?;
            let mut output = String::from_utf8_lossy(&out.stdout).to_string();
            output.push_str(&String::from_utf8_lossy(&out.stderr));
            return Ok(ProcessOutput {
                code: out.status.code(),
                output,
                log: None,
            });
        };

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_file = File::create(log_path)?;
        let status = cmd
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file))
            .status()?;

        Ok(ProcessOutput {
            code: status.code(),
            output: read_last_lines(log_path, LOG_TAIL_LINES).unwrap_or_default(),
            log: Some(log_path.clone()),
        })
    }
}

/// Last `n` lines of a log file.
///
/// Only the final 16 KiB are read; build logs of large packages run to many
/// megabytes.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const WINDOW: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let offset = file.metadata()?.len().saturating_sub(WINDOW);
    file.seek(SeekFrom::Start(offset))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);

    let mut lines: Vec<&str> = text.lines().collect();
    if offset > 0 && !lines.is_empty() {
        // started mid-line
        lines.remove(0);
    }
    let keep = lines.len().saturating_sub(n);
    Ok(lines.split_off(keep).join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::new("make").arg("-j4").arg("install");
        assert_eq!(cmd.to_string(), "make -j4 install");
    }

    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run(&CommandSpec::shell("echo out; echo err 1>&2; exit 3"))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }

    #[test]
    fn test_system_runner_writes_log() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("logs/step.log");
        let out = SystemRunner
            .run(&CommandSpec::shell("for i in 1 2 3; do echo line$i; done").log(&log))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.log.as_deref(), Some(log.as_path()));
        assert_eq!(out.output, "line1\nline2\nline3");
    }

    #[test]
    fn test_system_runner_uses_cwd_and_env() {
        let dir = tempdir().unwrap();
        let out = SystemRunner
            .run(
                &CommandSpec::shell("pwd -P; echo $EXTPKG_TEST_VAR")
                    .cwd(dir.path())
                    .env("EXTPKG_TEST_VAR", "hello"),
            )
            .unwrap();
        assert!(out.output.contains("hello"));
        let canonical = dir.path().canonicalize().unwrap();
        assert!(out.output.contains(canonical.to_str().unwrap()));
    }

    #[test]
    fn test_read_last_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build.log");
        let content: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
        std::fs::write(&path, content.join("\n")).unwrap();
        let tail = read_last_lines(&path, 3).unwrap();
        assert_eq!(tail, "line 97\nline 98\nline 99");
    }

    #[test]
    fn test_has_tool() {
        assert!(SystemRunner.has_tool("sh"));
        assert!(!SystemRunner.has_tool("extpkg-no-such-tool-xyz"));
    }
}
