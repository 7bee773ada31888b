//! Remap custom DeepSeek mixture-of-experts checkpoints to the MLX
//! DeepSeek-V3 layout.
//!
//! The source checkpoint stores per-expert routed weights at a narrower
//! intermediate width than its shared expert, and splits attention into
//! separate key, value and rope projections. The MLX runtime wants stacked
//! experts at a single `moe_intermediate_size` and fused MLA projections.
//!
//! ```text
//! SourceCheckpoint ──► Remapper ──► DestinationCheckpoint ──► write_destination
//!   (h.<i>.*)         catalogue      (model.layers.<i>.*)      weights.safetensors
//!                     + transforms                              config.json
//!                                                               weight_mapping_info.json
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use mlxremap_core::{RemapJob, MissingKeyPolicy};
//!
//! let report = RemapJob::new("model_weights/best_deepseek_v3.pt", "POC/mlx_model")
//!     .with_policy(MissingKeyPolicy::Strict)
//!     .run()?;
//! println!("{} tensors written", report.metadata.total_weights);
//! ```

pub mod catalogue;
pub mod checkpoint;
mod error;
pub mod fetch;
pub mod layout;
mod metadata;
mod pipeline;
mod progress;
pub mod remap;
pub mod shape;
mod source;
pub mod transform;
pub mod verify;
pub mod writer;

pub use checkpoint::{ExpertKind, LayerDescriptor, SourceCheckpoint, DEFAULT_SOURCE_PATH};
pub use error::{RemapError, Result};
pub use fetch::{fetch_checkpoint, FetchOptions};
pub use layout::AttentionLayout;
pub use metadata::TransformMetadata;
pub use pipeline::{RemapJob, RemapReport};
pub use remap::{DestinationCheckpoint, MissingKeyPolicy, RemapOutput, RemapStats, Remapper};
pub use shape::{pad_to, UnifiedShape};
pub use source::{CollectedExperts, ExpertProj, TensorSource};
pub use verify::{verify, verify_dir, VerificationReport, VerifyConfig};
pub use writer::{write_destination, WrittenFiles, DEFAULT_OUTPUT_DIR};
