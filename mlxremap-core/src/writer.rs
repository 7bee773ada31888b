//! Destination directory writer.
//!
//! Produces the three files the MLX runtime bundle needs:
//!
//! | File | Contents |
//! |------|----------|
//! | `weights.safetensors` | the remapped tensors |
//! | `config.json` | pre-existing; `moe_intermediate_size` and `n_shared_experts` overwritten |
//! | `weight_mapping_info.json` | [`TransformMetadata`] for the run |
//!
//! Nothing is written atomically; a failure part-way leaves whatever was
//! already on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{RemapError, Result};
use crate::metadata::TransformMetadata;
use crate::remap::DestinationCheckpoint;

/// Output directory used when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = "POC/mlx_model";

pub const WEIGHTS_FILE: &str = "weights.safetensors";
pub const CONFIG_FILE: &str = "config.json";
pub const METADATA_FILE: &str = "weight_mapping_info.json";

/// Paths of the files written by [`write_destination`].
#[derive(Debug, Clone)]
pub struct WrittenFiles {
    pub weights: PathBuf,
    pub config: PathBuf,
    pub metadata: PathBuf,
}

/// Write the destination checkpoint, patch `config.json` and save the metadata.
///
/// `config.json` must already exist in `output_dir`.
pub fn write_destination(
    output_dir: impl AsRef<Path>,
    destination: &DestinationCheckpoint,
    metadata: &TransformMetadata,
) -> Result<WrittenFiles> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).map_err(|e| RemapError::io(output_dir, e))?;

    let weights = output_dir.join(WEIGHTS_FILE);
    candle_core::safetensors::save(destination.tensors(), &weights)?;
    let size = fs::metadata(&weights)
        .map_err(|e| RemapError::io(&weights, e))?
        .len();
    info!(
        path = %weights.display(),
        tensors = destination.len(),
        size_mb = %format!("{:.2}", size as f64 / (1024.0 * 1024.0)),
        "Saved remapped weights"
    );

    let config = output_dir.join(CONFIG_FILE);
    update_config(&config, metadata.unified_intermediate_size)?;
    info!(
        path = %config.display(),
        moe_intermediate_size = metadata.unified_intermediate_size,
        n_shared_experts = 1,
        "Updated config"
    );

    let metadata_path = output_dir.join(METADATA_FILE);
    write_json(&metadata_path, metadata)?;
    info!(path = %metadata_path.display(), "Saved metadata");

    Ok(WrittenFiles {
        weights,
        config,
        metadata: metadata_path,
    })
}

/// Overwrite `moe_intermediate_size` and `n_shared_experts`, preserving
/// every other field and the key order.
pub fn update_config(path: &Path, unified_intermediate_size: usize) -> Result<()> {
    let mut config = read_config(path)?;
    let Some(fields) = config.as_object_mut() else {
        return Err(RemapError::Config {
            path: path.to_path_buf(),
            source: serde::de::Error::custom("config root is not a JSON object"),
        });
    };
    fields.insert(
        "moe_intermediate_size".to_string(),
        unified_intermediate_size.into(),
    );
    fields.insert("n_shared_experts".to_string(), 1.into());
    write_json(path, &config)
}

/// Parse a JSON config file.
pub fn read_config(path: &Path) -> Result<serde_json::Value> {
    let raw = fs::read_to_string(path).map_err(|e| RemapError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| RemapError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| RemapError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| RemapError::io(path, e))
}
