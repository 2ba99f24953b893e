#![warn(clippy::large_types_passed_by_value)]

pub mod embedding;
pub mod output;
pub mod pipeline;
pub mod shared;

pub use crate::embedding::{BertExtractor, EmbeddingExtractor};
pub use crate::output::{AnnotatedEmbeddingMatrix, Provenance, RowMetadata};
pub use crate::pipeline::EmbedPipeline;

pub use crate::shared::{
    AssemblyParameters, EmbedError, ExtractionParameters, Mode, Pooling, DEFAULT_MODEL,
};
