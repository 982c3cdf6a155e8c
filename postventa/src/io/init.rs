//! Initialization helpers for `.postventa/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{PostventaConfig, write_config};
use super::store_file::{STORE_SCHEMA, write_store};
use crate::model::Store;

/// All canonical paths within `.postventa/` for a project root.
#[derive(Debug, Clone)]
pub struct PostventaPaths {
    pub root: PathBuf,
    pub postventa_dir: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    pub schema_path: PathBuf,
}

impl PostventaPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let postventa_dir = root.join(".postventa");
        let state_dir = postventa_dir.join("state");
        Self {
            root,
            postventa_dir: postventa_dir.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: postventa_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            store_path: state_dir.join("store.json"),
            schema_path: state_dir.join("schema.json"),
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files (including the store).
    pub force: bool,
}

const GITIGNORE: &str = "*.tmp\n";

/// Create `.postventa/` scaffolding in `root` with an empty store.
///
/// Fails if `.postventa/` already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<PostventaPaths> {
    let paths = PostventaPaths::new(root);
    if paths.postventa_dir.exists() && !options.force {
        return Err(anyhow!(
            "postventa init: .postventa already exists (use --force to overwrite)"
        ));
    }
    if paths.postventa_dir.exists() && !paths.postventa_dir.is_dir() {
        return Err(anyhow!(
            "postventa init: .postventa exists but is not a directory"
        ));
    }

    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create directory {}", paths.state_dir.display()))?;
    write_file(&paths.gitignore_path, GITIGNORE)?;
    write_file(&paths.schema_path, STORE_SCHEMA)?;
    write_config(&paths.config_path, &PostventaConfig::default())?;
    write_store(&paths.store_path, &Store::default())?;
    Ok(paths)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}
