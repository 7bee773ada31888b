//! Tensor transforms referenced by the catalogue.

use candle_core::{DType, Device, Result, Tensor};

use crate::error::RemapError;
use crate::layout::AttentionLayout;
use crate::shape::pad_to;

/// Synthesized tensors are always F32 on the CPU.
const SYNTH_DTYPE: DType = DType::F32;

/// Identity RMSNorm weight.
pub fn ones(len: usize) -> Result<Tensor> {
    Tensor::ones(len, SYNTH_DTYPE, &Device::Cpu)
}

/// Neutral routing bias.
pub fn zeros(len: usize) -> Result<Tensor> {
    Tensor::zeros(len, SYNTH_DTYPE, &Device::Cpu)
}

/// Build `kv_a_proj_with_mqa` from the latent projection and the first rope head.
///
/// `kv_proj` is `[kv_lora_rank, hidden]`; `k_rope_proj` stacks one
/// `[qk_rope_head_dim, hidden]` block per head. The destination shares a
/// single rope key across heads, so only the first block is kept:
///
/// ```text
/// [kv_lora_rank, hidden] ++ [qk_rope_head_dim, hidden] -> [kv_lora_rank + qk_rope_head_dim, hidden]
/// ```
pub fn concat_rope_head(kv_proj: &Tensor, k_rope_proj: &Tensor, rope_dim: usize) -> Result<Tensor> {
    let rope_head = k_rope_proj.narrow(0, 0, rope_dim)?.contiguous()?;
    Tensor::cat(&[kv_proj, &rope_head], 0)
}

/// Build `kv_b_proj` from separate key and value decompressions.
///
/// Both inputs are `[heads * head_dim, kv_lora_rank]`. Per head, the first
/// `qk_nope_head_dim` key rows are followed by all `v_head_dim` value rows:
///
/// ```text
/// k: [heads, k_head_dim, rank] -> k_nope [heads, nope, rank]
/// v: [heads, v_head_dim, rank]
/// cat(k_nope, v, 1)            -> [heads, nope + v_head_dim, rank]
/// flatten                      -> [heads * (nope + v_head_dim), rank]
/// ```
pub fn interleave_kv_b(k: &Tensor, v: &Tensor, layout: &AttentionLayout) -> Result<Tensor> {
    let heads = layout.num_attention_heads;
    let (_, rank) = k.dims2()?;

    let k_per_head = k.reshape((heads, layout.k_head_dim(), rank))?;
    let v_per_head = v.reshape((heads, layout.v_head_dim, rank))?;

    let k_nope = k_per_head
        .narrow(1, 0, layout.qk_nope_head_dim)?
        .contiguous()?;
    Tensor::cat(&[&k_nope, &v_per_head], 1)?
        .reshape((heads * layout.kv_b_rows_per_head(), rank))
}

/// Pad each expert to `target` and stack them into `[experts, ..target]`.
///
/// Padding never truncates, so an expert wider than the target keeps its
/// shape; that makes the stack ragged and is rejected here.
pub fn stack_experts(key: &str, experts: &[Tensor], target: &[usize]) -> crate::Result<Tensor> {
    let padded = experts
        .iter()
        .map(|e| pad_to(e, target))
        .collect::<Result<Vec<_>>>()?;

    if let Some(odd) = padded.iter().find(|t| t.dims() != target) {
        return Err(RemapError::shape(
            key,
            format!(
                "expert of shape {:?} cannot be padded to {:?}",
                odd.dims(),
                target
            ),
        ));
    }
    Ok(Tensor::stack(&padded, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_vectors() -> Result<()> {
        let ones = ones(192)?;
        assert_eq!(ones.dims(), &[192]);
        assert_eq!(ones.dtype(), DType::F32);
        assert!(ones.to_vec1::<f32>()?.iter().all(|&x| x == 1.0));

        let zeros = zeros(8)?;
        assert_eq!(zeros.dims(), &[8]);
        assert!(zeros.to_vec1::<f32>()?.iter().all(|&x| x == 0.0));
        Ok(())
    }

    #[test]
    fn test_concat_rope_head_takes_first_block() -> Result<()> {
        let device = Device::Cpu;
        let kv_proj = Tensor::zeros((128, 16), DType::F32, &device)?;
        let k_rope = Tensor::arange(0f32, 256. * 16., &device)?.reshape((256, 16))?;

        let fused = concat_rope_head(&kv_proj, &k_rope, 32)?;
        assert_eq!(fused.dims(), &[160, 16]);

        let tail = fused.narrow(0, 128, 32)?;
        let expected = k_rope.narrow(0, 0, 32)?;
        assert_eq!(tail.to_vec2::<f32>()?, expected.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_interleave_kv_b_per_head_order() -> Result<()> {
        let device = Device::Cpu;
        let layout = AttentionLayout::default();
        let k = Tensor::arange(0f32, 512. * 128., &device)?.reshape((512, 128))?;
        let v = Tensor::arange(0f32, 512. * 128., &device)?
            .reshape((512, 128))?
            .neg()?;

        let kv_b = interleave_kv_b(&k, &v, &layout)?;
        assert_eq!(kv_b.dims(), &[768, 128]);

        for h in 0..8 {
            let nope = kv_b.narrow(0, h * 96, 32)?;
            let k_rows = k.narrow(0, h * 64, 32)?;
            assert_eq!(nope.to_vec2::<f32>()?, k_rows.to_vec2::<f32>()?);

            let value = kv_b.narrow(0, h * 96 + 32, 64)?;
            let v_rows = v.narrow(0, h * 64, 64)?;
            assert_eq!(value.to_vec2::<f32>()?, v_rows.to_vec2::<f32>()?);
        }
        Ok(())
    }

    #[test]
    fn test_interleave_kv_b_rejects_wrong_geometry() -> Result<()> {
        let device = Device::Cpu;
        let k = Tensor::zeros((100, 128), DType::F32, &device)?;
        let v = Tensor::zeros((512, 128), DType::F32, &device)?;
        assert!(interleave_kv_b(&k, &v, &AttentionLayout::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_stack_experts_pads_then_stacks() -> crate::Result<()> {
        let device = Device::Cpu;
        let experts = vec![
            Tensor::ones((2, 3), DType::F32, &device)?,
            Tensor::ones((2, 3), DType::F32, &device)?,
        ];
        let stacked = stack_experts("gate", &experts, &[4, 3])?;
        assert_eq!(stacked.dims(), &[2, 4, 3]);
        let first = stacked.get(0)?.to_vec2::<f32>()?;
        assert_eq!(first[1], vec![1., 1., 1.]);
        assert_eq!(first[2], vec![0., 0., 0.]);
        Ok(())
    }

    #[test]
    fn test_stack_experts_rejects_oversized_expert() -> candle_core::Result<()> {
        let device = Device::Cpu;
        let experts = vec![
            Tensor::ones((2, 3), DType::F32, &device)?,
            Tensor::ones((6, 3), DType::F32, &device)?,
        ];
        let err = stack_experts("gate", &experts, &[4, 3]).expect_err("ragged stack");
        assert!(matches!(err, RemapError::ShapeMismatch { .. }));
        Ok(())
    }
}
