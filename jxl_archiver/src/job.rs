//! Core per-file job data threaded through the pipeline.

use crate::classifier::{Classification, Format};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One file discovered under the root directory, with its classification
/// already resolved.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: PathBuf,
    pub classification: Classification,
}

impl Job {
    pub fn new(source: PathBuf, classification: Classification) -> Self {
        Self { source, classification }
    }

    pub fn format(&self) -> Option<Format> {
        self.classification.format
    }

    pub fn is_animated(&self) -> bool {
        self.classification.animated
    }

    pub fn output_path(&self) -> PathBuf {
        self.source.with_extension("jxl")
    }

    pub fn tmp_output_path(&self) -> PathBuf {
        let mut name = self
            .source
            .file_name()
            .unwrap_or_default()
            .to_os_string();
        name.push(".jxl.tmp");
        self.source.with_file_name(name)
    }
}

/// Terminal outcome of running one job to completion.
#[derive(Debug)]
pub enum JobOutcome {
    Converted {
        source: PathBuf,
        output: PathBuf,
        duration: Duration,
        metadata_tier: shared_utils::PropagationTier,
        /// Source file size, captured before the atomic replacer unlinks
        /// it — by the time stats are tallied the source path no longer
        /// exists to stat.
        source_bytes: u64,
    },
    Failed(crate::error::JobError),
}

impl JobOutcome {
    pub fn source_path(&self) -> &Path {
        match self {
            JobOutcome::Converted { source, .. } => source,
            JobOutcome::Failed(e) => e.path(),
        }
    }
}
