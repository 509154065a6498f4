use crate::output::print_json;
use anyhow::Context;
use devstack_core::probe::HealthCheck;
use devstack_core::tunnel::webhook_url;
use std::path::Path;

/// Ask the running tunnel for its public URL.
pub fn run(root: &Path, save: bool, json: bool) -> anyhow::Result<()> {
    let (manifest, mut store) = super::load_project(root)?;
    let svc = manifest
        .tunnel_service()
        .context("no service in the manifest derives a tunnel URL")?;
    let Some(derive) = &svc.derive else {
        anyhow::bail!("service '{}' has no derive rule", svc.name);
    };

    let body = svc
        .health
        .probe()
        .check(&store)
        .with_context(|| format!("tunnel service '{}' is not running", svc.name))?;
    let public = (derive.extractor.extractor())(&body).with_context(|| {
        format!(
            "tunnel service '{}' is running but exposes no https endpoint",
            svc.name
        )
    })?;

    let saved = if save {
        store.upsert(&derive.key, &public)?
    } else {
        false
    };

    if json {
        return print_json(&serde_json::json!({
            "public_url": public,
            "webhook_url": webhook_url(&public),
            "key": derive.key,
            "saved": saved,
        }));
    }

    println!("Public URL:   {public}");
    println!("Webhook URL:  {}", webhook_url(&public));
    if save {
        if saved {
            println!("Saved to {} as {}", store.path().display(), derive.key);
        } else {
            println!("{} already up to date", derive.key);
        }
    }
    Ok(())
}
