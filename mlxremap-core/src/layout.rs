//! Attention geometry used by the fused-projection transforms.
//!
//! The source attention keeps separate key/value decompressions and a
//! per-head rope projection; the destination expects DeepSeek-style MLA
//! projections. Rebuilding those needs a handful of dimensions:
//!
//! ```text
//! kv_a_proj_with_mqa: [kv_lora_rank + qk_rope_head_dim, hidden]
//! kv_b_proj:          [heads * (qk_nope_head_dim + v_head_dim), kv_lora_rank]
//! q_a_layernorm:      [q_lora_rank]
//! ```
//!
//! Defaults describe the small DeepSeek-V3 reproduction this tool was built
//! for. Any of the fields present in the destination `config.json` override
//! them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RemapError, Result};

fn default_q_lora_rank() -> usize {
    192
}

fn default_num_attention_heads() -> usize {
    8
}

fn default_qk_nope_head_dim() -> usize {
    32
}

fn default_qk_rope_head_dim() -> usize {
    32
}

fn default_v_head_dim() -> usize {
    64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttentionLayout {
    /// Width of the synthesized `q_a_layernorm`.
    pub q_lora_rank: usize,
    pub num_attention_heads: usize,
    /// Unrotated slice of each key head kept in `kv_b_proj`.
    pub qk_nope_head_dim: usize,
    /// Rotated slice; also the number of `k_rope_proj` rows moved into `kv_a_proj_with_mqa`.
    pub qk_rope_head_dim: usize,
    pub v_head_dim: usize,
}

impl Default for AttentionLayout {
    fn default() -> Self {
        Self {
            q_lora_rank: default_q_lora_rank(),
            num_attention_heads: default_num_attention_heads(),
            qk_nope_head_dim: default_qk_nope_head_dim(),
            qk_rope_head_dim: default_qk_rope_head_dim(),
            v_head_dim: default_v_head_dim(),
        }
    }
}

/// Subset of `config.json` that can override the layout.
///
/// Every field is optional; `null` (e.g. `"q_lora_rank": null`) keeps the default.
#[derive(Debug, Default, Deserialize)]
struct LayoutOverrides {
    q_lora_rank: Option<usize>,
    num_attention_heads: Option<usize>,
    qk_nope_head_dim: Option<usize>,
    qk_rope_head_dim: Option<usize>,
    v_head_dim: Option<usize>,
}

impl AttentionLayout {
    /// Rows per head in the source `k_decompress` (nope + rope).
    pub fn k_head_dim(&self) -> usize {
        self.qk_nope_head_dim + self.qk_rope_head_dim
    }

    /// Rows per head in the destination `kv_b_proj` (k_nope followed by v).
    pub fn kv_b_rows_per_head(&self) -> usize {
        self.qk_nope_head_dim + self.v_head_dim
    }

    /// Apply overrides from a parsed `config.json`.
    ///
    /// Fails if any override field is present with a non-integer value, so a
    /// malformed config never silently falls back to the defaults.
    pub fn with_config(self, config: &serde_json::Value) -> serde_json::Result<Self> {
        let overrides = LayoutOverrides::deserialize(config)?;
        Ok(Self {
            q_lora_rank: overrides.q_lora_rank.unwrap_or(self.q_lora_rank),
            num_attention_heads: overrides
                .num_attention_heads
                .unwrap_or(self.num_attention_heads),
            qk_nope_head_dim: overrides.qk_nope_head_dim.unwrap_or(self.qk_nope_head_dim),
            qk_rope_head_dim: overrides.qk_rope_head_dim.unwrap_or(self.qk_rope_head_dim),
            v_head_dim: overrides.v_head_dim.unwrap_or(self.v_head_dim),
        })
    }

    /// Read the layout from `config.json`, falling back to defaults when the
    /// file does not exist.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| RemapError::io(path, e))?;
        let config_error = |source| RemapError::Config {
            path: path.to_path_buf(),
            source,
        };
        let config: serde_json::Value = serde_json::from_str(&raw).map_err(config_error)?;
        Self::default().with_config(&config).map_err(config_error)
    }
}
