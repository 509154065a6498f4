use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use devstack_core::env_file::EnvFile;
use devstack_core::manifest::Manifest;
use devstack_core::{secrets, DevstackError};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand definition
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum EnvSubcommand {
    /// List all entries in file order
    List {
        /// Show secret values in full
        #[arg(long)]
        reveal: bool,
    },
    /// Print the value of one key
    Get { key: String },
    /// Set a key, replacing its line or appending one
    Set { key: String, value: String },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: EnvSubcommand, json: bool) -> anyhow::Result<()> {
    // The env file can be used before a manifest exists.
    let manifest = match Manifest::load(root) {
        Ok(m) => m,
        Err(DevstackError::ManifestNotFound(_)) => Manifest::default(),
        Err(e) => return Err(e).context("failed to load manifest"),
    };
    let mut store = EnvFile::load(manifest.env_path(root)).context("failed to read env file")?;

    match subcmd {
        EnvSubcommand::List { reveal } => list(&store, &manifest.secrets, reveal, json),
        EnvSubcommand::Get { key } => get(&store, &key, json),
        EnvSubcommand::Set { key, value } => set(&mut store, &key, &value, json),
    }
}

fn list(store: &EnvFile, secret_keys: &[String], reveal: bool, json: bool) -> anyhow::Result<()> {
    let shown = |key: &str, value: &str| -> String {
        if !reveal && secret_keys.iter().any(|k| k == key) {
            secrets::redact(value)
        } else {
            value.to_string()
        }
    };

    if json {
        let map: serde_json::Map<String, serde_json::Value> = store
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(shown(k, v))))
            .collect();
        return print_json(&map);
    }

    let rows = store
        .entries()
        .into_iter()
        .map(|(k, v)| vec![k.to_string(), shown(k, v)])
        .collect();
    print_table(&["KEY", "VALUE"], rows);
    Ok(())
}

fn get(store: &EnvFile, key: &str, json: bool) -> anyhow::Result<()> {
    let value = store
        .get(key)
        .with_context(|| format!("'{key}' is not set in {}", store.path().display()))?;
    if json {
        print_json(&serde_json::json!({ "key": key, "value": value }))
    } else {
        println!("{value}");
        Ok(())
    }
}

fn set(store: &mut EnvFile, key: &str, value: &str, json: bool) -> anyhow::Result<()> {
    let changed = store.upsert(key, value)?;
    if json {
        print_json(&serde_json::json!({ "key": key, "changed": changed }))
    } else {
        if changed {
            println!("{key} updated in {}", store.path().display());
        } else {
            println!("{key} unchanged");
        }
        Ok(())
    }
}
