//! Sequence handling shared by the pipeline stages (reading, dedup, validation)
pub mod error;
pub mod parameters;
pub mod parser;
pub mod sequence;
pub mod utils;

pub use error::{EmbedError, Result};
pub use parameters::{AssemblyParameters, ExtractionParameters, Pooling, DEFAULT_MODEL};
pub use parser::read_sequence_file;
pub use sequence::{adheres_to_vocab, filter_valid, Mode};
pub use utils::dedup;
