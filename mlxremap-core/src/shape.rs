//! Intermediate-size reconciliation between routed and shared experts.
//!
//! The destination runtime stores a single `moe_intermediate_size`, so routed
//! experts are widened to the shared expert width by appending zeros. Zeros
//! always go at the high-index end of each axis; the existing values occupy
//! the leading `[0, routed)` block unchanged, so the padded expert computes
//! the same function as the unpadded one.

use candle_core::{Result, Tensor};
use tracing::warn;

/// The intermediate width every routed expert is padded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnifiedShape {
    pub routed: usize,
    pub shared: usize,
    pub unified: usize,
}

impl UnifiedShape {
    /// `unified = max(routed, shared)`.
    pub fn reconcile(routed: usize, shared: usize) -> Self {
        Self {
            routed,
            shared,
            unified: routed.max(shared),
        }
    }

    /// Whether routed experts need widening.
    pub fn padding_required(&self) -> bool {
        self.routed < self.unified
    }
}

/// Zero-pad `tensor` at the high end of each axis until it reaches `target`.
///
/// - equal shapes: returned as is (same storage)
/// - rank 1 and rank 2: each axis padded by `target - current`, clamped at 0
/// - any other rank, or a target of different rank: returned unchanged
///
/// An axis already larger than its target is left as stored; this function
/// never truncates.
pub fn pad_to(tensor: &Tensor, target: &[usize]) -> Result<Tensor> {
    let dims = tensor.dims();
    if dims == target {
        return Ok(tensor.clone());
    }
    if !(1..=2).contains(&dims.len()) || dims.len() != target.len() {
        return Ok(tensor.clone());
    }

    let mut padded = tensor.clone();
    for (axis, (&current, &wanted)) in dims.iter().zip(target).enumerate() {
        if wanted > current {
            padded = padded.pad_with_zeros(axis, 0, wanted - current)?;
        } else if wanted < current {
            warn!(axis, current, wanted, "Dimension exceeds target, left unpadded");
        }
    }
    Ok(padded)
}
