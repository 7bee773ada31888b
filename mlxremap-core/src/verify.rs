//! Post-hoc presence check of a remapped checkpoint.
//!
//! Simulates what the MLX loader looks up: the embedding, every per-layer
//! key of the catalogue, the final norm and the head. Shapes and values are
//! not inspected.

use std::path::Path;

use candle_core::Device;
use serde::Deserialize;
use tracing::info;

use crate::catalogue::required_keys;
use crate::error::{RemapError, Result};
use crate::remap::DestinationCheckpoint;
use crate::source::TensorSource;
use crate::writer::{read_config, CONFIG_FILE, WEIGHTS_FILE};

/// Fields of the destination `config.json` the verifier reads.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    pub num_hidden_layers: usize,
    #[serde(default)]
    pub n_routed_experts: Option<usize>,
    #[serde(default)]
    pub n_shared_experts: Option<usize>,
    #[serde(default)]
    pub hidden_size: Option<usize>,
    #[serde(default)]
    pub moe_intermediate_size: Option<usize>,
}

impl VerifyConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        serde_json::from_value(read_config(path)?).map_err(|source| RemapError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    fn shared_experts_enabled(&self) -> bool {
        self.n_shared_experts.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Tensors present in the checkpoint.
    pub total: usize,
    /// Required keys that are absent, in catalogue order.
    pub missing: Vec<String>,
}

impl VerificationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check `weights` against the key catalogue implied by `config`.
pub fn verify(weights: &impl TensorSource, config: &VerifyConfig) -> VerificationReport {
    let missing = required_keys(config.num_hidden_layers, config.shared_experts_enabled())
        .into_iter()
        .filter(|key| !weights.contains_tensor(key))
        .collect();
    VerificationReport {
        total: weights.num_tensors(),
        missing,
    }
}

/// Load `weights.safetensors` and `config.json` from `output_dir` and verify them.
pub fn verify_dir(output_dir: impl AsRef<Path>) -> Result<VerificationReport> {
    let output_dir = output_dir.as_ref();
    let config = VerifyConfig::from_file(&output_dir.join(CONFIG_FILE))?;
    info!(
        layers = config.num_hidden_layers,
        experts = ?config.n_routed_experts,
        shared_experts = ?config.n_shared_experts,
        hidden_size = ?config.hidden_size,
        moe_intermediate_size = ?config.moe_intermediate_size,
        "Config summary"
    );

    let weights_path = output_dir.join(WEIGHTS_FILE);
    if !weights_path.exists() {
        return Err(RemapError::NotFound { path: weights_path });
    }
    let weights: DestinationCheckpoint =
        candle_core::safetensors::load(&weights_path, &Device::Cpu)?.into();

    let report = verify(&weights, &config);
    info!(
        total = report.total,
        missing = report.missing.len(),
        "Verification results"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Tensor};
    use std::collections::HashMap;

    fn config(layers: usize, shared: usize) -> VerifyConfig {
        VerifyConfig {
            num_hidden_layers: layers,
            n_routed_experts: Some(8),
            n_shared_experts: Some(shared),
            hidden_size: None,
            moe_intermediate_size: None,
        }
    }

    fn weights_with(keys: &[String]) -> candle_core::Result<HashMap<String, Tensor>> {
        let device = Device::Cpu;
        keys.iter()
            .map(|k| -> candle_core::Result<(String, Tensor)> {
                Ok((k.clone(), Tensor::zeros(1, DType::F32, &device)?))
            })
            .collect()
    }

    #[test]
    fn test_complete_checkpoint_has_no_missing_keys() -> candle_core::Result<()> {
        let weights = weights_with(&required_keys(2, true))?;
        let report = verify(&weights, &config(2, 1));
        assert!(report.is_complete());
        assert_eq!(report.total, weights.len());
        Ok(())
    }

    #[test]
    fn test_reports_each_missing_key() -> candle_core::Result<()> {
        let mut keys = required_keys(2, true);
        keys.retain(|k| k != "model.layers.1.self_attn.o_proj.weight" && k != "lm_head.weight");
        let report = verify(&weights_with(&keys)?, &config(2, 1));
        assert_eq!(
            report.missing,
            vec![
                "model.layers.1.self_attn.o_proj.weight".to_string(),
                "lm_head.weight".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_shared_experts_only_required_when_enabled() -> candle_core::Result<()> {
        let weights = weights_with(&required_keys(1, false))?;
        assert!(verify(&weights, &config(1, 0)).is_complete());
        assert_eq!(verify(&weights, &config(1, 1)).missing.len(), 3);
        Ok(())
    }

    #[test]
    fn test_config_defaults() -> serde_json::Result<()> {
        let config: VerifyConfig = serde_json::from_str(r#"{"num_hidden_layers": 3}"#)?;
        assert_eq!(config.num_hidden_layers, 3);
        assert!(!config.shared_experts_enabled());
        Ok(())
    }
}
