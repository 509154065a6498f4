pub mod check;
pub mod env;
pub mod init;
pub mod logs;
pub mod status;
pub mod up;
pub mod url;
pub mod validate;

use anyhow::Context;
use devstack_core::env_file::EnvFile;
use devstack_core::manifest::Manifest;
use std::path::Path;

/// Load the manifest and the env file it points at.
pub(crate) fn load_project(root: &Path) -> anyhow::Result<(Manifest, EnvFile)> {
    let manifest = Manifest::load(root).context("failed to load manifest")?;
    let store = EnvFile::load(manifest.env_path(root)).context("failed to read env file")?;
    Ok((manifest, store))
}
