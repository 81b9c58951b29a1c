//! A-pass driver: read one portrait, synthesize its artifacts, write
//! them to the working directory.

use std::path::Path;

use retouch_pipeline::{APassConfig, APassOutput, PipelineError, synthesize};

use crate::workdir::{WorkDir, WorkDirError, load_rgb};

/// Why the A-pass failed for an image.
#[derive(Debug, thiserror::Error)]
pub enum APassError {
    /// Reading the input or writing an artifact failed.
    #[error(transparent)]
    WorkDir(#[from] WorkDirError),

    /// The input cannot be processed.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

/// Run the A-pass for `input`, writing artifacts into `workdir`.
///
/// # Errors
///
/// Returns [`APassError`] if the input cannot be read, is empty, or an
/// artifact cannot be written.
pub fn run_a_pass(input: &Path, workdir: &WorkDir, config: &APassConfig) -> Result<APassOutput, APassError> {
    let image = load_rgb(input)?;
    tracing::debug!(input = %input.display(), width = image.width(), height = image.height(), "A-pass");
    let output = synthesize(&image, config)?;
    workdir.write_a_pass(&output)?;
    Ok(output)
}
