//! Download of the source checkpoint from the Hugging Face Hub.

use std::fs;
use std::path::{Path, PathBuf};

use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use tracing::{error, info};

use crate::error::{RemapError, Result};

pub const DEFAULT_REPO_ID: &str = "Mayank022/DeepSeek-V3-from-Scratch";
pub const DEFAULT_FILENAME: &str = "best_deepseek_v3.pt";
pub const DEFAULT_LOCAL_DIR: &str = "model_weights";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub repo_id: String,
    pub filename: String,
    /// Directory the file is copied into (created if absent).
    pub local_dir: PathBuf,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            repo_id: DEFAULT_REPO_ID.to_string(),
            filename: DEFAULT_FILENAME.to_string(),
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
        }
    }
}

impl FetchOptions {
    /// Where the checkpoint ends up.
    pub fn target_path(&self) -> PathBuf {
        self.local_dir.join(&self.filename)
    }
}

/// Download the checkpoint described by `options`.
///
/// Failures are logged and reported as `false`; this never returns an error.
/// An existing file at the target path is kept and counts as success.
pub fn fetch_checkpoint(options: &FetchOptions) -> bool {
    match try_fetch(options) {
        Ok(path) => {
            info!(path = %path.display(), "Download complete");
            true
        }
        Err(e) => {
            error!(repo = %options.repo_id, file = %options.filename, "{e}");
            false
        }
    }
}

fn try_fetch(options: &FetchOptions) -> Result<PathBuf> {
    let target = options.target_path();
    if target.exists() {
        info!(path = %target.display(), "Checkpoint already present, skipping download");
        return Ok(target);
    }
    fs::create_dir_all(&options.local_dir).map_err(|e| RemapError::io(&options.local_dir, e))?;

    info!(repo = %options.repo_id, file = %options.filename, "Downloading checkpoint");
    let api = ApiBuilder::new().with_progress(true).build()?;
    let cached = api
        .repo(Repo::new(options.repo_id.clone(), RepoType::Model))
        .get(&options.filename)?;

    copy_out_of_cache(&cached, &target)?;
    Ok(target)
}

/// The hub cache stores snapshots as symlinks; copy the real bytes out.
fn copy_out_of_cache(cached: &Path, target: &Path) -> Result<()> {
    fs::copy(cached, target).map_err(|e| RemapError::io(target, e))?;
    Ok(())
}
