//! Extraction of fixed-size vectors from validated sequences.
//!
//! The pipeline only knows the [`EmbeddingExtractor`] trait; any inference
//! backend can be plugged in. [`bert::BertExtractor`] runs a pretrained BERT
//! encoder (e.g. `wukevin/tcr-bert`) with `candle`.
pub mod bert;
pub mod loader;
pub mod tokenizer;

use crate::shared::{ExtractionParameters, Result};
use ndarray::Array2;

pub use bert::BertExtractor;
pub use tokenizer::ResidueTokenizer;

pub trait EmbeddingExtractor {
    /// Return one row per sequence, in the order of `sequences`.
    fn extract(&self, sequences: &[String], params: &ExtractionParameters) -> Result<Array2<f64>>;
}

impl<E: EmbeddingExtractor + ?Sized> EmbeddingExtractor for &E {
    fn extract(&self, sequences: &[String], params: &ExtractionParameters) -> Result<Array2<f64>> {
        (**self).extract(sequences, params)
    }
}
