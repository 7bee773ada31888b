//! The source-to-destination key catalogue.
//!
//! Every destination tensor is described by one [`Mapping`]: the source keys
//! it reads, the destination key it writes and the [`Transform`] between
//! them. The remapper walks these tables and the verifier derives its
//! required-key list from the same tables, so the two can never disagree.
//!
//! Layer mappings use suffixes; `h.{i}.` is prepended on the source side and
//! `model.layers.{i}.` on the destination side.

use crate::source::ExpertProj;

/// How a destination tensor is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Identity copy of the single source tensor.
    Copy,
    /// All-ones vector of length `q_lora_rank`; no source.
    Ones,
    /// All-zeros vector of length `expert_count(layer)`; no source.
    ZerosPerExpert,
    /// `cat([kv_proj, k_rope_proj[..qk_rope_head_dim]], 0)`.
    ConcatRopeHead,
    /// Per-head interleave of `k_decompress` nope rows and `v_decompress`.
    InterleaveKvB,
    /// Pad every routed expert to the unified size and stack on a new axis 0.
    StackExperts(ExpertProj),
}

/// Which part of the model a mapping belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Core,
    /// Only required when the destination config enables shared experts.
    SharedExpert,
}

#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    pub sources: &'static [&'static str],
    pub dest: &'static str,
    pub transform: Transform,
    pub group: Group,
}

impl Mapping {
    const fn new(sources: &'static [&'static str], dest: &'static str, transform: Transform) -> Self {
        Self {
            sources,
            dest,
            transform,
            group: Group::Core,
        }
    }

    const fn shared(sources: &'static [&'static str], dest: &'static str) -> Self {
        Self {
            sources,
            dest,
            transform: Transform::Copy,
            group: Group::SharedExpert,
        }
    }

    /// Whether the tensor is synthesized rather than read from the source.
    pub fn is_synthesized(&self) -> bool {
        matches!(self.transform, Transform::Ones | Transform::ZerosPerExpert)
    }
}

/// Mappings that precede the repeating layers.
pub const LEADING_MAPPINGS: &[Mapping] = &[Mapping::new(
    &["wte.weight"],
    "model.embed_tokens.weight",
    Transform::Copy,
)];

/// Mappings that follow the repeating layers.
pub const TRAILING_MAPPINGS: &[Mapping] = &[
    Mapping::new(&["ln_f.weight"], "model.norm.weight", Transform::Copy),
    Mapping::new(&["lm_head.weight"], "lm_head.weight", Transform::Copy),
];

/// Mappings applied to every layer, as suffixes of `h.{i}` / `model.layers.{i}`.
pub const LAYER_MAPPINGS: &[Mapping] = &[
    // Norms
    Mapping::new(&["ln_1.weight"], "input_layernorm.weight", Transform::Copy),
    Mapping::new(&["ln_2.weight"], "post_attention_layernorm.weight", Transform::Copy),
    // Attention
    Mapping::new(&["attn.q_proj.weight"], "self_attn.q_a_proj.weight", Transform::Copy),
    Mapping::new(&[], "self_attn.q_a_layernorm.weight", Transform::Ones),
    Mapping::new(&["attn.q_decompress.weight"], "self_attn.q_b_proj.weight", Transform::Copy),
    Mapping::new(
        &["attn.kv_proj.weight", "attn.k_rope_proj.weight"],
        "self_attn.kv_a_proj_with_mqa.weight",
        Transform::ConcatRopeHead,
    ),
    Mapping::new(&["attn.kv_norm.weight"], "self_attn.kv_a_layernorm.weight", Transform::Copy),
    Mapping::new(
        &["attn.k_decompress.weight", "attn.v_decompress.weight"],
        "self_attn.kv_b_proj.weight",
        Transform::InterleaveKvB,
    ),
    Mapping::new(&["attn.o_proj.weight"], "self_attn.o_proj.weight", Transform::Copy),
    // Router
    Mapping::new(&["mlp.router.weight"], "mlp.gate.weight", Transform::Copy),
    Mapping::new(&[], "mlp.gate.e_score_correction_bias", Transform::ZerosPerExpert),
    // Routed experts
    Mapping::new(
        &[],
        "mlp.switch_mlp.gate_proj.weight",
        Transform::StackExperts(ExpertProj::Gate),
    ),
    Mapping::new(
        &[],
        "mlp.switch_mlp.up_proj.weight",
        Transform::StackExperts(ExpertProj::Up),
    ),
    Mapping::new(
        &[],
        "mlp.switch_mlp.down_proj.weight",
        Transform::StackExperts(ExpertProj::Down),
    ),
    // Shared expert
    Mapping::shared(
        &["mlp.shared_expert.gate_proj.weight"],
        "mlp.shared_experts.gate_proj.weight",
    ),
    Mapping::shared(
        &["mlp.shared_expert.up_proj.weight"],
        "mlp.shared_experts.up_proj.weight",
    ),
    Mapping::shared(
        &["mlp.shared_expert.down_proj.weight"],
        "mlp.shared_experts.down_proj.weight",
    ),
];

pub fn source_prefix(layer: usize) -> String {
    format!("h.{layer}")
}

pub fn dest_prefix(layer: usize) -> String {
    format!("model.layers.{layer}")
}

/// A mapping with its keys resolved for one layer (or for the globals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlan {
    pub layer: Option<usize>,
    pub sources: Vec<String>,
    pub dest: String,
    pub transform: Transform,
    pub group: Group,
}

fn resolve(mapping: &Mapping, layer: Option<usize>) -> KeyPlan {
    let (sources, dest) = match layer {
        Some(i) => {
            let src = source_prefix(i);
            (
                mapping
                    .sources
                    .iter()
                    .map(|s| format!("{src}.{s}"))
                    .collect(),
                format!("{}.{}", dest_prefix(i), mapping.dest),
            )
        }
        None => (
            mapping.sources.iter().map(|s| s.to_string()).collect(),
            mapping.dest.to_string(),
        ),
    };
    KeyPlan {
        layer,
        sources,
        dest,
        transform: mapping.transform,
        group: mapping.group,
    }
}

fn plan_unlayered(mappings: &[Mapping]) -> Vec<KeyPlan> {
    mappings.iter().map(|m| resolve(m, None)).collect()
}

/// Mappings outside the repeating layers, leading then trailing.
pub fn plan_globals() -> Vec<KeyPlan> {
    LEADING_MAPPINGS
        .iter()
        .chain(TRAILING_MAPPINGS)
        .map(|m| resolve(m, None))
        .collect()
}

pub fn plan_layer(layer: usize) -> Vec<KeyPlan> {
    LAYER_MAPPINGS.iter().map(|m| resolve(m, Some(layer))).collect()
}

/// Every destination key a complete checkpoint must contain.
///
/// Shared expert keys are included only when `include_shared` is set.
pub fn required_keys(num_layers: usize, include_shared: bool) -> Vec<String> {
    let wanted = |plan: &KeyPlan| include_shared || plan.group != Group::SharedExpert;
    let mut keys: Vec<String> = plan_unlayered(LEADING_MAPPINGS)
        .into_iter()
        .map(|p| p.dest)
        .collect();
    for layer in 0..num_layers {
        keys.extend(plan_layer(layer).into_iter().filter(wanted).map(|p| p.dest));
    }
    keys.extend(plan_unlayered(TRAILING_MAPPINGS).into_iter().map(|p| p.dest));
    keys
}
