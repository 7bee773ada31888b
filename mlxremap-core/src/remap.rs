//! Source-to-destination remapping.
//!
//! Walks the [catalogue](crate::catalogue) for the globals and for every
//! layer, producing a new name-to-tensor map in the destination convention.
//!
//! # Missing keys
//!
//! Under [`MissingKeyPolicy::BestEffort`] an absent source tensor omits the
//! destination key and records it in [`RemapStats::skipped`]; the output is
//! then incomplete and only the verifier will notice. Under
//! [`MissingKeyPolicy::Strict`] the first absent tensor aborts the run.

use std::collections::HashMap;

use candle_core::Tensor;
use tracing::{debug, info, info_span, warn};

use crate::catalogue::{plan_globals, plan_layer, source_prefix, KeyPlan, Transform};
use crate::checkpoint::{ExpertKind, SourceCheckpoint};
use crate::error::{RemapError, Result};
use crate::layout::AttentionLayout;
use crate::metadata::TransformMetadata;
use crate::progress::NiceProgressBar;
use crate::shape::UnifiedShape;
use crate::source::{ExpertProj, TensorSource};
use crate::transform;

/// What to do when a source tensor named by the catalogue is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Omit the destination key and keep going.
    #[default]
    BestEffort,
    /// Fail with [`RemapError::MissingKey`].
    Strict,
}

/// Counters for the progress summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapStats {
    pub source_tensors: usize,
    /// Destination tensors produced.
    pub mapped: usize,
    /// Destination keys omitted because a source tensor was absent.
    pub skipped: Vec<String>,
}

impl RemapStats {
    /// Mapped tensors as a percentage of source tensors.
    pub fn mapping_rate(&self) -> f64 {
        if self.source_tensors == 0 {
            return 0.0;
        }
        self.mapped as f64 / self.source_tensors as f64 * 100.0
    }
}

/// The remapped checkpoint. Immutable once built.
#[derive(Debug, Default)]
pub struct DestinationCheckpoint {
    tensors: HashMap<String, Tensor>,
}

impl DestinationCheckpoint {
    pub fn tensors(&self) -> &HashMap<String, Tensor> {
        &self.tensors
    }

    pub fn into_tensors(self) -> HashMap<String, Tensor> {
        self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl From<HashMap<String, Tensor>> for DestinationCheckpoint {
    fn from(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }
}

impl TensorSource for DestinationCheckpoint {
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

/// Result of [`Remapper::remap`].
#[derive(Debug)]
pub struct RemapOutput {
    pub destination: DestinationCheckpoint,
    pub stats: RemapStats,
    pub shape: UnifiedShape,
    pub metadata: TransformMetadata,
}

/// Checkpoint-wide values every mapping may need.
struct RemapContext<'a> {
    source: &'a SourceCheckpoint,
    shape: UnifiedShape,
    hidden_size: Option<usize>,
}

pub struct Remapper {
    layout: AttentionLayout,
    policy: MissingKeyPolicy,
}

impl Default for Remapper {
    fn default() -> Self {
        Self::new(AttentionLayout::default())
    }
}

impl Remapper {
    pub fn new(layout: AttentionLayout) -> Self {
        Self {
            layout,
            policy: MissingKeyPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn layout(&self) -> &AttentionLayout {
        &self.layout
    }

    pub fn policy(&self) -> MissingKeyPolicy {
        self.policy
    }

    /// Remap `source` into the destination convention.
    pub fn remap(&self, source: &SourceCheckpoint) -> Result<RemapOutput> {
        let _span = info_span!("remap", source = %source.path().display()).entered();

        let num_layers = source.layer_count();
        let num_experts = source.max_expert_count();
        info!(num_layers, num_experts, "Detected checkpoint structure");

        let shape = UnifiedShape::reconcile(
            source.intermediate_size(ExpertKind::Routed),
            source.intermediate_size(ExpertKind::Shared),
        );
        info!(
            routed = shape.routed,
            shared = shape.shared,
            unified = shape.unified,
            "Using unified intermediate size"
        );
        if shape.padding_required() {
            info!(
                from = shape.routed,
                to = shape.unified,
                "Routed experts will be zero-padded"
            );
        }

        let hidden_size = source.hidden_size();
        if hidden_size.is_none() {
            warn!("`wte.weight` absent, expert hidden dimension taken from each expert");
        }

        let ctx = RemapContext {
            source,
            shape,
            hidden_size,
        };
        let mut tensors = HashMap::new();
        let mut stats = RemapStats {
            source_tensors: source.num_tensors(),
            ..Default::default()
        };

        for plan in plan_globals() {
            self.apply(&ctx, &plan, &mut tensors, &mut stats)?;
        }
        for layer in NiceProgressBar::new(0..num_layers, "Remapping layers") {
            for plan in plan_layer(layer) {
                self.apply(&ctx, &plan, &mut tensors, &mut stats)?;
            }
        }

        info!(
            source = stats.source_tensors,
            mapped = stats.mapped,
            skipped = stats.skipped.len(),
            rate = %format!("{:.1}%", stats.mapping_rate()),
            "Mapping summary"
        );

        let metadata = TransformMetadata {
            source_file: source.path().display().to_string(),
            num_layers,
            num_experts,
            routed_intermediate_size: shape.routed,
            shared_intermediate_size: shape.shared,
            unified_intermediate_size: shape.unified,
            total_weights: tensors.len(),
            padding_applied: shape.padding_required(),
        };

        Ok(RemapOutput {
            destination: tensors.into(),
            stats,
            shape,
            metadata,
        })
    }

    /// Fetch every source tensor of `plan`.
    ///
    /// `Ok(None)` means at least one is absent and the key should be skipped.
    fn sources<'a>(
        &self,
        ctx: &RemapContext<'a>,
        plan: &KeyPlan,
        stats: &mut RemapStats,
    ) -> Result<Option<Vec<&'a Tensor>>> {
        let mut found = Vec::with_capacity(plan.sources.len());
        for key in &plan.sources {
            match ctx.source.get_tensor(key) {
                Some(t) => found.push(t),
                None => {
                    self.missing(key, &plan.dest, stats)?;
                    return Ok(None);
                }
            }
        }
        Ok(Some(found))
    }

    fn missing(&self, source_key: &str, dest: &str, stats: &mut RemapStats) -> Result<()> {
        if self.policy == MissingKeyPolicy::Strict {
            return Err(RemapError::MissingKey {
                key: source_key.to_string(),
            });
        }
        debug!(source_key, dest, "Source tensor absent, destination omitted");
        stats.skipped.push(dest.to_string());
        Ok(())
    }

    fn apply(
        &self,
        ctx: &RemapContext<'_>,
        plan: &KeyPlan,
        out: &mut HashMap<String, Tensor>,
        stats: &mut RemapStats,
    ) -> Result<()> {
        let tensor = match plan.transform {
            Transform::Ones => transform::ones(self.layout.q_lora_rank)?,
            Transform::ZerosPerExpert => {
                let experts = plan.layer.map_or(0, |l| ctx.source.expert_count(l));
                transform::zeros(experts)?
            }
            Transform::StackExperts(proj) => match self.stack(ctx, plan, proj, stats)? {
                Some(t) => t,
                None => return Ok(()),
            },
            Transform::Copy | Transform::ConcatRopeHead | Transform::InterleaveKvB => {
                let Some(inputs) = self.sources(ctx, plan, stats)? else {
                    return Ok(());
                };
                self.combine(plan, &inputs)?
            }
        };

        out.insert(plan.dest.clone(), tensor);
        stats.mapped += 1;
        Ok(())
    }

    fn combine(&self, plan: &KeyPlan, inputs: &[&Tensor]) -> Result<Tensor> {
        let fused = match (plan.transform, inputs) {
            (Transform::Copy, [t]) => return Ok((*t).clone()),
            (Transform::ConcatRopeHead, [kv, k_rope]) => {
                transform::concat_rope_head(kv, k_rope, self.layout.qk_rope_head_dim)
            }
            (Transform::InterleaveKvB, [k, v]) => transform::interleave_kv_b(k, v, &self.layout),
            (transform, inputs) => {
                return Err(RemapError::shape(
                    &plan.dest,
                    format!("{transform:?} cannot take {} inputs", inputs.len()),
                ))
            }
        };
        fused.map_err(|e| RemapError::shape(&plan.dest, e.to_string()))
    }

    fn stack(
        &self,
        ctx: &RemapContext<'_>,
        plan: &KeyPlan,
        proj: ExpertProj,
        stats: &mut RemapStats,
    ) -> Result<Option<Tensor>> {
        let Some(layer) = plan.layer else {
            return Ok(None);
        };
        let prefix = format!("{}.mlp", source_prefix(layer));
        let collected = ctx
            .source
            .collect_experts(&prefix, proj, ctx.source.expert_count(layer));

        if let Some(first_missing) = collected.missing.first() {
            if self.policy == MissingKeyPolicy::Strict {
                return Err(RemapError::MissingKey {
                    key: first_missing.clone(),
                });
            }
            for key in &collected.missing {
                debug!(source_key = %key, dest = %plan.dest, "Expert absent, excluded from stack");
            }
        }
        let Some(first) = collected.tensors.first() else {
            self.missing(&format!("{prefix}.experts.*.{}.weight", proj.name()), &plan.dest, stats)?;
            return Ok(None);
        };

        let unified = ctx.shape.unified;
        let target = match (proj.intermediate_is_rows(), first.dims()) {
            (true, [_, cols]) => vec![unified, ctx.hidden_size.unwrap_or(*cols)],
            (false, [rows, _]) => vec![ctx.hidden_size.unwrap_or(*rows), unified],
            (_, dims) => {
                return Err(RemapError::shape(
                    &plan.dest,
                    format!("expected rank-2 expert weights, got {dims:?}"),
                ))
            }
        };
        transform::stack_experts(&plan.dest, &collected.tensors, &target).map(Some)
    }
}
