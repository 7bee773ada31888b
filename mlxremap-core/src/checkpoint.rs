//! Source checkpoint loading and attribute discovery.
//!
//! The source convention is a flat state dict:
//!
//! ```text
//! wte.weight                                  token embedding [vocab, hidden]
//! h.<layer>.ln_1.weight / ln_2.weight         pre-attention / pre-MLP norms
//! h.<layer>.attn.*                            compressed attention projections
//! h.<layer>.mlp.router.weight                 router [experts, hidden]
//! h.<layer>.mlp.experts.<j>.{gate,up,down}_proj.weight
//! h.<layer>.mlp.shared_expert.{gate,up,down}_proj.weight
//! ln_f.weight, lm_head.weight
//! ```
//!
//! Layer count, expert count and the two intermediate sizes are not stored
//! anywhere; they are recovered from key names and tensor shapes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use candle_core::{Device, Tensor};
use regex::Regex;
use tracing::{info, warn};

use crate::error::{RemapError, Result};
use crate::source::TensorSource;

/// Checkpoint used when no path is given on the command line.
pub const DEFAULT_SOURCE_PATH: &str = "model_weights/best_deepseek_v3.pt";

/// Routed expert gate projection probed for the routed intermediate size.
pub const ROUTED_SENTINEL_KEY: &str = "h.0.mlp.experts.0.gate_proj.weight";
/// Shared expert gate projection probed for the shared intermediate size.
pub const SHARED_SENTINEL_KEY: &str = "h.0.mlp.shared_expert.gate_proj.weight";

pub const DEFAULT_ROUTED_INTERMEDIATE_SIZE: usize = 512;
pub const DEFAULT_SHARED_INTERMEDIATE_SIZE: usize = 768;

static LAYER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^h\.(\d+)\.").expect("layer key pattern"));
static EXPERT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^h\.(\d+)\.mlp\.experts\.(\d+)\.").expect("expert key pattern")
});

/// Which expert family an intermediate size is read for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertKind {
    Routed,
    Shared,
}

impl ExpertKind {
    fn sentinel_key(&self) -> &'static str {
        match self {
            Self::Routed => ROUTED_SENTINEL_KEY,
            Self::Shared => SHARED_SENTINEL_KEY,
        }
    }

    fn fallback_size(&self) -> usize {
        match self {
            Self::Routed => DEFAULT_ROUTED_INTERMEDIATE_SIZE,
            Self::Shared => DEFAULT_SHARED_INTERMEDIATE_SIZE,
        }
    }
}

/// Per-layer attributes recovered from key patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub layer_index: usize,
    pub expert_count: usize,
    pub routed_intermediate_size: usize,
    pub shared_intermediate_size: usize,
}

/// A loaded source checkpoint. Read-only once constructed.
pub struct SourceCheckpoint {
    path: PathBuf,
    tensors: HashMap<String, Tensor>,
}

impl SourceCheckpoint {
    /// Load a checkpoint from disk.
    ///
    /// `*.safetensors` files are read as safetensors; anything else is
    /// treated as a PyTorch pickle state dict (`.pt`, `.pth`, `.bin`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RemapError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let is_safetensors = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("safetensors"));
        let tensors: HashMap<String, Tensor> = if is_safetensors {
            candle_core::safetensors::load(path, &Device::Cpu)?
        } else {
            candle_core::pickle::read_all(path)?.into_iter().collect()
        };

        info!(
            path = %path.display(),
            tensors = tensors.len(),
            "Loaded source checkpoint"
        );
        Ok(Self::from_tensors(path, tensors))
    }

    /// Wrap tensors that are already in memory.
    pub fn from_tensors(path: impl Into<PathBuf>, tensors: HashMap<String, Tensor>) -> Self {
        Self {
            path: path.into(),
            tensors,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tensors(&self) -> &HashMap<String, Tensor> {
        &self.tensors
    }

    /// Number of transformer layers: highest `h.<i>.` index + 1, or 0.
    pub fn layer_count(&self) -> usize {
        self.tensors
            .keys()
            .filter_map(|k| LAYER_KEY.captures(k))
            .filter_map(|c| c[1].parse::<usize>().ok())
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Number of routed experts in `layer`: highest expert index + 1, or 0.
    pub fn expert_count(&self, layer: usize) -> usize {
        self.tensors
            .keys()
            .filter_map(|k| EXPERT_KEY.captures(k))
            .filter(|c| c[1].parse::<usize>().ok() == Some(layer))
            .filter_map(|c| c[2].parse::<usize>().ok())
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Largest expert count over all layers.
    pub fn max_expert_count(&self) -> usize {
        (0..self.layer_count())
            .map(|layer| self.expert_count(layer))
            .max()
            .unwrap_or(0)
    }

    /// Leading dimension of the sentinel gate projection for `kind`.
    ///
    /// Falls back to 512 (routed) or 768 (shared) when the sentinel key is
    /// absent. The fallback is logged because it can hide a malformed
    /// checkpoint.
    pub fn intermediate_size(&self, kind: ExpertKind) -> usize {
        let key = kind.sentinel_key();
        match self.tensors.get(key).and_then(|t| t.dims().first().copied()) {
            Some(size) => size,
            None => {
                let fallback = kind.fallback_size();
                warn!(key, fallback, "Sentinel tensor absent, using default intermediate size");
                fallback
            }
        }
    }

    /// Hidden size, read from the embedding (`wte.weight` is `[vocab, hidden]`).
    pub fn hidden_size(&self) -> Option<usize> {
        self.tensors
            .get("wte.weight")
            .and_then(|t| t.dims().get(1).copied())
    }

    pub fn layer_descriptor(&self, layer: usize) -> LayerDescriptor {
        LayerDescriptor {
            layer_index: layer,
            expert_count: self.expert_count(layer),
            routed_intermediate_size: self.intermediate_size(ExpertKind::Routed),
            shared_intermediate_size: self.intermediate_size(ExpertKind::Shared),
        }
    }
}

impl TensorSource for SourceCheckpoint {
    fn get_tensor(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    fn tensor_names(&self) -> Vec<&str> {
        self.tensors.keys().map(String::as_str).collect()
    }

    fn num_tensors(&self) -> usize {
        self.tensors.len()
    }
}
