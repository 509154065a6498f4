use crate::output::{print_json, print_table};
use anyhow::Context;
use devstack_core::manifest::Manifest;
use devstack_core::tools::{self, ToolStatus};
use devstack_core::DevstackError;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ToolRow {
    #[serde(flatten)]
    status: ToolStatus,
    required_by: Vec<String>,
    optional: bool,
}

/// Report which programs the manifest needs and whether they are installed.
/// Falls back to the default stack when no manifest exists yet.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = match Manifest::load(root) {
        Ok(m) => m,
        Err(DevstackError::ManifestNotFound(_)) => Manifest::whatsapp_bot(),
        Err(e) => return Err(e).context("failed to load manifest"),
    };

    let rows: Vec<ToolRow> = tools::requirements(&manifest)
        .into_iter()
        .map(|req| ToolRow {
            status: tools::detect(&req.program),
            required_by: req.required_by,
            optional: req.optional,
        })
        .collect();

    if json {
        print_json(&rows)?;
    } else {
        let table = rows
            .iter()
            .map(|r| {
                let state = match (r.status.found(), r.optional) {
                    (true, _) => "found",
                    (false, true) => "missing (optional)",
                    (false, false) => "MISSING",
                };
                vec![
                    r.status.name.clone(),
                    state.to_string(),
                    r.status.version.clone().unwrap_or_default(),
                    r.required_by.join(", "),
                ]
            })
            .collect();
        print_table(&["TOOL", "STATUS", "VERSION", "USED BY"], table);
    }

    let missing: Vec<&str> = rows
        .iter()
        .filter(|r| !r.optional && !r.status.found())
        .map(|r| r.status.name.as_str())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
