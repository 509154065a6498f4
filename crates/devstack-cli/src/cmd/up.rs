use crate::output::{print_json, print_table};
use crate::signal::cancel_on_ctrl_c;
use anyhow::Context;
use devstack_core::manifest::{Manifest, WarnLevel};
use devstack_core::orchestrator::{has_fatal_failure, Orchestrator, Outcome, ServiceReport};
use devstack_core::secrets;
use devstack_core::tunnel::{webhook_url, TUNNEL_URL_KEY};
use std::path::Path;

pub fn run(root: &Path, only: &[String], no_open: bool, json: bool) -> anyhow::Result<()> {
    let (manifest, mut store) = super::load_project(root)?;
    let manifest = if only.is_empty() {
        manifest
    } else {
        manifest.subset(only)?
    };

    for w in manifest.validate() {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }

    for key in &manifest.secrets {
        if let Some(fresh) = secrets::ensure_api_key(&mut store, key)? {
            if !json {
                println!("Generated {key} = {}", secrets::redact(&fresh));
            }
        }
    }

    let specs = manifest
        .service_specs(root)
        .context("cannot build service plan")?;

    let cancel = cancel_on_ctrl_c();
    let result = Orchestrator::new(&cancel).run(&specs, &mut store);

    let (reports, run_error) = match result {
        Ok(reports) => (reports, None),
        Err(e) => (e.reports().to_vec(), Some(e)),
    };

    if json {
        print_json(&serde_json::json!({
            "ok": run_error.is_none() && !has_fatal_failure(&reports),
            "services": reports,
        }))?;
    } else {
        print_reports(&reports);
        print_tunnel_urls(&reports);
    }

    if let Some(e) = run_error {
        return Err(e.into());
    }

    if !no_open {
        open_pages(&manifest, &reports, &store);
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.is_fatal())
        .map(|r| r.name.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("required services failed to start: {}", failed.join(", "));
    }
    Ok(())
}

fn print_reports(reports: &[ServiceReport]) {
    println!();
    let rows = reports
        .iter()
        .map(|r| {
            let detail = match (&r.outcome, &r.derived) {
                (Outcome::StartFailed { cause }, _) => cause.to_string(),
                (Outcome::StartedButUnhealthy { attempts }, _) => {
                    format!("no answer after {attempts} attempts")
                }
                (_, Some(d)) if d.placeholder => format!("{} = {} (placeholder)", d.key, d.value),
                (_, Some(d)) => format!("{} = {}", d.key, d.value),
                (_, None) => String::new(),
            };
            let name = if r.optional {
                format!("{} (optional)", r.name)
            } else {
                r.name.clone()
            };
            vec![
                name,
                r.outcome.as_str().to_string(),
                format!("{:.1}s", r.elapsed_ms as f64 / 1000.0),
                detail,
            ]
        })
        .collect();
    print_table(&["SERVICE", "STATUS", "TIME", "DETAIL"], rows);
}

fn print_tunnel_urls(reports: &[ServiceReport]) {
    let Some(derived) = reports
        .iter()
        .filter_map(|r| r.derived.as_ref())
        .find(|d| d.key == TUNNEL_URL_KEY && !d.placeholder)
    else {
        return;
    };
    println!();
    println!("  Public URL:   {}", derived.value);
    println!("  Webhook URL:  {}", webhook_url(&derived.value));
}

fn open_pages(
    manifest: &Manifest,
    reports: &[ServiceReport],
    store: &devstack_core::env_file::EnvFile,
) {
    for report in reports.iter().filter(|r| r.outcome.is_healthy()) {
        let Some(svc) = manifest.service(&report.name) else {
            continue;
        };
        for page in &svc.open {
            let url = store.interpolate(page);
            if let Err(e) = open::that(&url) {
                tracing::warn!(service = %report.name, %url, "could not open browser: {e}");
            }
        }
    }
}
