//! End-to-end remap run: load, remap, write.

use std::path::PathBuf;

use tracing::info;

use crate::checkpoint::{SourceCheckpoint, DEFAULT_SOURCE_PATH};
use crate::error::Result;
use crate::layout::AttentionLayout;
use crate::metadata::TransformMetadata;
use crate::remap::{MissingKeyPolicy, RemapStats, Remapper};
use crate::writer::{write_destination, WrittenFiles, CONFIG_FILE, DEFAULT_OUTPUT_DIR};

/// One remap invocation.
#[derive(Debug, Clone)]
pub struct RemapJob {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub policy: MissingKeyPolicy,
}

impl Default for RemapJob {
    fn default() -> Self {
        Self {
            source: PathBuf::from(DEFAULT_SOURCE_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            policy: MissingKeyPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct RemapReport {
    pub metadata: TransformMetadata,
    pub stats: RemapStats,
    pub files: WrittenFiles,
}

impl RemapJob {
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load the source, remap it and write the output directory.
    ///
    /// The attention layout is read from the output `config.json` when it
    /// exists. The source checkpoint is dropped before writing.
    pub fn run(&self) -> Result<RemapReport> {
        let source = SourceCheckpoint::load(&self.source)?;
        let layout = AttentionLayout::from_config_file(self.output_dir.join(CONFIG_FILE))?;
        info!(?layout, policy = ?self.policy, "Remapping");

        let output = Remapper::new(layout)
            .with_policy(self.policy)
            .remap(&source)?;
        drop(source);

        let files = write_destination(&self.output_dir, &output.destination, &output.metadata)?;
        Ok(RemapReport {
            metadata: output.metadata,
            stats: output.stats,
            files,
        })
    }
}
