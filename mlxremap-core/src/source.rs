//! Tensor source abstraction shared by the remapper and the verifier.
//!
//! Both sides of a remap are plain name-to-tensor maps, so the catalogue
//! code is written against [`TensorSource`] rather than a concrete map.
//! The remapper reads a [`SourceCheckpoint`](crate::SourceCheckpoint); the
//! verifier reads whatever was written to `weights.safetensors`.
//!
//! ```text
//! TensorSource          - name lookup over a checkpoint
//!     │
//!     └── collect_experts   - per-expert gather for stacking
//! ```

use std::collections::HashMap;

use candle_core::Tensor;

/// Projection inside a SwiGLU expert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpertProj {
    Gate,
    Up,
    Down,
}

impl ExpertProj {
    pub const ALL: [ExpertProj; 3] = [ExpertProj::Gate, ExpertProj::Up, ExpertProj::Down];

    /// Key segment used by both conventions (`gate_proj`, `up_proj`, `down_proj`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gate => "gate_proj",
            Self::Up => "up_proj",
            Self::Down => "down_proj",
        }
    }

    /// Whether the intermediate dimension is the leading (row) axis.
    ///
    /// gate/up are `[intermediate, hidden]`, down is `[hidden, intermediate]`.
    pub fn intermediate_is_rows(&self) -> bool {
        !matches!(self, Self::Down)
    }
}

/// Expert tensors gathered for one projection of one layer.
#[derive(Debug, Default)]
pub struct CollectedExperts {
    /// Present experts, in expert-index order.
    pub tensors: Vec<Tensor>,
    /// Source keys that were expected but absent.
    pub missing: Vec<String>,
}

impl CollectedExperts {
    pub fn num_experts(&self) -> usize {
        self.tensors.len()
    }
}

/// Read access to a checkpoint by tensor name.
pub trait TensorSource {
    /// Look up a tensor by its full key.
    fn get_tensor(&self, name: &str) -> Option<&Tensor>;

    /// All tensor names, in no particular order.
    fn tensor_names(&self) -> Vec<&str>;

    /// Check if a tensor exists in this source.
    fn contains_tensor(&self, name: &str) -> bool {
        self.get_tensor(name).is_some()
    }

    fn num_tensors(&self) -> usize {
        self.tensor_names().len()
    }

    /// Gather `{prefix}.experts.{j}.{proj}.weight` for `j in 0..num_experts`.
    ///
    /// Absent experts are recorded in `missing` and skipped.
    fn collect_experts(
        &self,
        prefix: &str,
        proj: ExpertProj,
        num_experts: usize,
    ) -> CollectedExperts {
        let mut collected = CollectedExperts::default();
        for j in 0..num_experts {
            let key = format!("{prefix}.experts.{j}.{}.weight", proj.name());
            match self.get_tensor(&key) {
                Some(t) => collected.tensors.push(t.clone()),
                None => collected.missing.push(key),
            }
        }
        collected
    }
}

impl TensorSource for HashMap<String, Tensor> {
    fn get_tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name)
    }

    fn tensor_names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }

    fn num_tensors(&self) -> usize {
        self.len()
    }
}
