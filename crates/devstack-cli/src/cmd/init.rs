use crate::output::print_json;
use anyhow::Context;
use devstack_core::env_file::EnvFile;
use devstack_core::io::ensure_gitignore_entry;
use devstack_core::manifest::{default_env, manifest_path, Manifest};
use devstack_core::secrets;
use std::path::Path;

/// Write the default manifest and seed the env file.
///
/// An existing manifest is kept unless `force` is set. Env values are only
/// added when missing, so `init` never clobbers local edits.
pub fn run(root: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    let path = manifest_path(root);
    let wrote_manifest = force || !path.exists();
    let manifest = if wrote_manifest {
        let m = Manifest::whatsapp_bot();
        m.save(root).context("failed to write manifest")?;
        m
    } else {
        Manifest::load(root).context("failed to load manifest")?
    };

    let mut store = EnvFile::load(manifest.env_path(root)).context("failed to read env file")?;
    let mut seeded: Vec<String> = Vec::new();
    for (key, value) in default_env() {
        if store.insert_if_missing(key, value)? {
            seeded.push(key.to_string());
        }
    }
    for key in &manifest.secrets {
        if secrets::ensure_api_key(&mut store, key)?.is_some() {
            seeded.push(key.clone());
        }
    }

    for entry in [".env", ".devstack/"] {
        ensure_gitignore_entry(root, entry)?;
    }

    if json {
        return print_json(&serde_json::json!({
            "manifest": path,
            "manifest_written": wrote_manifest,
            "env_file": store.path(),
            "seeded": seeded,
        }));
    }

    if wrote_manifest {
        println!("Wrote {}", path.display());
    } else {
        println!("Kept existing {}", path.display());
    }
    if seeded.is_empty() {
        println!("{} already complete", store.path().display());
    } else {
        println!("Seeded {}: {}", store.path().display(), seeded.join(", "));
    }
    println!();
    println!("Next: devstack check   (verify docker, ngrok, ollama, python)");
    println!("      devstack up      (start everything)");
    Ok(())
}
