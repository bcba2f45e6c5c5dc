//! Error taxonomy for the tiling engine.
//!
//! Every failure is fatal for the image being processed; there are no
//! retries. Progress/logging problems never surface here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Static parameter violation, detected before any tile is processed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Model load, session creation, or a single inference call failed.
    #[error("inference backend error: {0}")]
    Backend(String),

    /// Observed output tile dimensions disagree with the declared scale
    /// factor. Reported before any bytes reach the destination buffer.
    #[error(
        "output tile is {observed_w}x{observed_h}, expected {expected}x{expected} \
         for a x{scale} model (input tile {input_w}x{input_h})"
    )]
    TileSizeMismatch {
        expected: usize,
        observed_w: usize,
        observed_h: usize,
        input_w: usize,
        input_h: usize,
        scale: u32,
    },

    /// Model file could not be read.
    #[error("model file {path}: {source}")]
    ModelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ort::Error> for Error {
    fn from(err: ort::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
