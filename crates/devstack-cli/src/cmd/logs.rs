use crate::output::print_json;
use anyhow::Context;
use devstack_core::io::tail_lines;
use devstack_core::manifest::Manifest;
use devstack_core::DevstackError;
use std::path::Path;

/// Print the end of the log file a service's start command writes to.
pub fn run(root: &Path, service: &str, lines: usize, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(root).context("failed to load manifest")?;
    if manifest.service(service).is_none() {
        return Err(DevstackError::ServiceNotFound(service.to_string()).into());
    }

    let path = manifest.log_path(root, service);
    if !path.exists() {
        anyhow::bail!(
            "no log for '{service}' yet at {}: it is written when 'devstack up' starts the service",
            path.display()
        );
    }
    let tail = tail_lines(&path, lines)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "service": service,
            "path": path,
            "lines": tail,
        }));
    }
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
