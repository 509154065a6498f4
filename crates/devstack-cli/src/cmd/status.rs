use crate::output::{print_json, print_table};
use devstack_core::probe::HealthCheck;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ServiceStatus {
    name: String,
    up: bool,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Probe every declared service once. Nothing is started.
pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (manifest, store) = super::load_project(root)?;

    let statuses: Vec<ServiceStatus> = manifest
        .services
        .iter()
        .map(|svc| {
            let probe = svc.health.probe();
            let result = probe.check(&store);
            ServiceStatus {
                name: svc.name.clone(),
                up: result.is_ok(),
                target: store.interpolate(&probe.target()),
                error: result.err().map(|e| e.to_string()),
            }
        })
        .collect();

    if json {
        return print_json(&statuses);
    }

    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                if s.up { "up" } else { "down" }.to_string(),
                s.target.clone(),
            ]
        })
        .collect();
    print_table(&["SERVICE", "STATE", "HEALTH CHECK"], rows);

    if let Some(url) = store.get(devstack_core::tunnel::TUNNEL_URL_KEY) {
        println!();
        println!("  {} = {url}", devstack_core::tunnel::TUNNEL_URL_KEY);
    }
    Ok(())
}
