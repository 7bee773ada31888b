use serde::{Deserialize, Serialize};

/// Record of one remap run, persisted as `weight_mapping_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformMetadata {
    pub source_file: String,
    pub num_layers: usize,
    pub num_experts: usize,
    pub routed_intermediate_size: usize,
    pub shared_intermediate_size: usize,
    pub unified_intermediate_size: usize,
    /// Number of tensors in the destination checkpoint.
    pub total_weights: usize,
    pub padding_applied: bool,
}
