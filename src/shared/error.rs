//! Errors returned by the embedding pipeline.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The input file could not be opened or decoded.
    #[error("cannot read input {path:?}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// No sequence survived loading and alphabet validation.
    #[error("no valid sequences found in {path:?}")]
    EmptyInput { path: PathBuf },

    /// The model identifier or its files could not be resolved.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("embedding extraction failed: {0}")]
    Inference(String),

    #[error("layer {layer} does not exist ({available} hidden states available)")]
    LayerOutOfRange { layer: i64, available: usize },

    /// Vectors and metadata disagree on the number of rows.
    #[error("shape mismatch: {vectors} embedding rows for {metadata} metadata rows")]
    ShapeMismatch { vectors: usize, metadata: usize },

    /// The output format only stores finite numbers.
    #[error("embedding value {value} at row {row}, column {col} is not finite")]
    NonFiniteValue { row: usize, col: usize, value: f64 },

    #[error("cannot write output {path:?}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read annotated matrix {path:?}: {source}")]
    OutputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EmbedError {
    pub(crate) fn inference(e: impl std::fmt::Display) -> Self {
        EmbedError::Inference(format!("{e:#}"))
    }

    pub(crate) fn model_load(e: impl std::fmt::Display) -> Self {
        EmbedError::ModelLoad(format!("{e:#}"))
    }
}
