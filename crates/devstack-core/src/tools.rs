//! Prerequisite tool detection.
//!
//! devstack only drives external programs (container engine, tunnel client,
//! LLM server, language runtime). This module answers "is it installed, and
//! which version" before anything is launched.

use crate::launch::locate_program;
use crate::manifest::Manifest;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// A program the manifest needs, and which services need it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRequirement {
    pub program: String,
    pub required_by: Vec<String>,
    /// True when every service using the program is optional.
    pub optional: bool,
}

/// Locate `name` and read the first line of `name --version`.
pub fn detect(name: &str) -> ToolStatus {
    let path = locate_program(name).ok();
    let version = path.as_ref().and_then(|p| read_version(p));
    ToolStatus {
        name: name.to_string(),
        path,
        version,
    }
}

fn read_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    // Some tools print their version on stderr.
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Distinct start programs of `manifest`, in first-use order.
pub fn requirements(manifest: &Manifest) -> Vec<ToolRequirement> {
    let mut reqs: Vec<ToolRequirement> = Vec::new();
    for svc in &manifest.services {
        match reqs.iter_mut().find(|r| r.program == svc.start.program) {
            Some(req) => {
                req.required_by.push(svc.name.clone());
                req.optional &= svc.optional;
            }
            None => reqs.push(ToolRequirement {
                program: svc.start.program.clone(),
                required_by: vec![svc.name.clone()],
                optional: svc.optional,
            }),
        }
    }
    reqs
}
