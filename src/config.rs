// Producer configuration.

use std::path::PathBuf;

use crate::archive::compression::PayloadCompression;

/// What to do when the delta's output path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Atomically replace the existing file.
    #[default]
    Replace,
    /// Fail with `DeltaError::OutputExists`.
    Fail,
}

/// Configuration for a `DeltaProducer`.
#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Directory the delta is written into.
    pub output_dir: PathBuf,
    pub overwrite: OverwritePolicy,
    /// Payload compression for the delta. `None` reuses the new archive's.
    pub compression: Option<PayloadCompression>,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            overwrite: OverwritePolicy::Replace,
            compression: None,
        }
    }
}

impl ProducerOptions {
    /// Default options writing into `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: dir.into(),
            ..Default::default()
        }
    }
}
