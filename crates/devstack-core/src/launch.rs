//! Start commands for external services.
//!
//! A start command only launches: the orchestrator never waits for the
//! process to exit, it waits for the health check instead. Processes are
//! left running when devstack exits.

use crate::env_file::EnvFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

// ---------------------------------------------------------------------------
// StartFailure
// ---------------------------------------------------------------------------

/// Why a service could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartFailure {
    #[error("'{program}' not found on PATH; install it and re-run 'devstack up'")]
    PrerequisiteMissing { program: String },

    #[error("failed to launch '{program}': {message}")]
    CommandFailed { program: String, message: String },

    #[error("dependency '{dependency}' did not start")]
    DependencyFailed { dependency: String },
}

// ---------------------------------------------------------------------------
// StartAction
// ---------------------------------------------------------------------------

pub trait StartAction: Send + Sync {
    /// Issue the start command. `config` supplies `${KEY}` values produced by
    /// services that came up earlier in the run.
    fn start(&self, config: &EnvFile) -> Result<(), StartFailure>;

    fn describe(&self) -> String;
}

/// Wraps a closure as a start action.
pub struct FnStart<F> {
    label: String,
    action: F,
}

impl<F> FnStart<F>
where
    F: Fn(&EnvFile) -> Result<(), StartFailure> + Send + Sync,
{
    pub fn new(label: impl Into<String>, action: F) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

impl<F> StartAction for FnStart<F>
where
    F: Fn(&EnvFile) -> Result<(), StartFailure> + Send + Sync,
{
    fn start(&self, config: &EnvFile) -> Result<(), StartFailure> {
        (self.action)(config)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ---------------------------------------------------------------------------
// ProcessCommand
// ---------------------------------------------------------------------------

/// An external program launched detached from devstack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Where stdout/stderr go. Discarded when unset.
    #[serde(skip)]
    pub log_file: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            log_file: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve the program to an executable path.
    pub fn locate(&self) -> Result<PathBuf, StartFailure> {
        locate_program(&self.program)
    }

    fn stdio_for_log(&self) -> std::io::Result<(Stdio, Stdio)> {
        let Some(path) = &self.log_file else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let err = file.try_clone()?;
        Ok((Stdio::from(file), Stdio::from(err)))
    }
}

impl StartAction for ProcessCommand {
    fn start(&self, config: &EnvFile) -> Result<(), StartFailure> {
        let binary = self.locate()?;
        let failed = |e: std::io::Error| StartFailure::CommandFailed {
            program: self.program.clone(),
            message: e.to_string(),
        };

        let (stdout, stderr) = self.stdio_for_log().map_err(failed)?;

        let mut cmd = Command::new(&binary);
        cmd.args(self.args.iter().map(|a| config.interpolate(a)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        for (key, value) in &self.env {
            cmd.env(key, config.interpolate(value));
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        detach(&mut cmd);

        let child = cmd.spawn().map_err(failed)?;
        tracing::info!(program = %self.program, pid = child.id(), "launched");
        // Dropping the handle does not stop the process.
        drop(child);
        Ok(())
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Put the child in its own process group so a Ctrl-C aimed at devstack
/// does not also stop the services it launched.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Find `program` on `PATH`, or check it directly when it is a path.
pub fn locate_program(program: &str) -> Result<PathBuf, StartFailure> {
    let missing = || StartFailure::PrerequisiteMissing {
        program: program.to_string(),
    };
    if program.trim().is_empty() {
        return Err(missing());
    }
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return if as_path.is_file() {
            Ok(as_path.to_path_buf())
        } else {
            Err(missing())
        };
    }
    which::which(program).map_err(|_| missing())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
