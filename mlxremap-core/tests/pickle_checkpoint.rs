//! Loading a PyTorch `.pt` state dict through the pickle reader.
//!
//! `fixtures/tiny_moe.pt` is a torch zip archive holding an `OrderedDict` of
//! F32 tensors. Every element of tensor `i` (in insertion order) equals
//! `i * 100 + k` for its flat index `k`:
//!
//! | # | key | shape |
//! |---|---|---|
//! | 0 | `wte.weight` | `[4, 4]` |
//! | 1 | `h.0.ln_1.weight` | `[4]` |
//! | 2-3 | `h.0.mlp.experts.{0,1}.gate_proj.weight` | `[2, 4]` |
//! | 4-6 | `h.1.mlp.experts.{0,1,2}.gate_proj.weight` | `[2, 4]` |

use std::path::PathBuf;

use candle_core::DType;
use mlxremap_core::{ExpertKind, SourceCheckpoint, TensorSource};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tiny_moe.pt")
}

#[test]
fn test_load_pickle_state_dict() -> mlxremap_core::Result<()> {
    let checkpoint = SourceCheckpoint::load(fixture())?;

    assert_eq!(checkpoint.num_tensors(), 7);
    assert_eq!(checkpoint.layer_count(), 2);
    assert_eq!(checkpoint.expert_count(0), 2);
    assert_eq!(checkpoint.expert_count(1), 3);
    assert_eq!(checkpoint.max_expert_count(), 3);
    assert_eq!(checkpoint.hidden_size(), Some(4));
    assert_eq!(checkpoint.intermediate_size(ExpertKind::Routed), 2);
    Ok(())
}

#[test]
fn test_pickle_tensor_values() -> mlxremap_core::Result<()> {
    let checkpoint = SourceCheckpoint::load(fixture())?;

    let wte = checkpoint.get_tensor("wte.weight").expect("wte.weight");
    assert_eq!(wte.dtype(), DType::F32);
    assert_eq!(wte.dims(), &[4, 4]);
    assert_eq!(wte.to_vec2::<f32>()?[1], vec![4.0, 5.0, 6.0, 7.0]);

    let norm = checkpoint
        .get_tensor("h.0.ln_1.weight")
        .expect("h.0.ln_1.weight");
    assert_eq!(norm.to_vec1::<f32>()?, vec![100.0, 101.0, 102.0, 103.0]);

    let gate = checkpoint
        .get_tensor("h.1.mlp.experts.2.gate_proj.weight")
        .expect("expert 2 gate");
    assert_eq!(gate.dims(), &[2, 4]);
    assert_eq!(gate.to_vec2::<f32>()?[0][0], 600.0);
    Ok(())
}
