use anyhow::Result;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use ndarray::Array2;
use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use tcr_embed::embedding::bert::{BertEncoder, Config, HiddenAct};
use tcr_embed::embedding::{BertExtractor, EmbeddingExtractor, ResidueTokenizer};
use tcr_embed::shared;
use tcr_embed::ExtractionParameters;
use tempfile::TempDir;

/// Vocabulary of the TCR models: auxiliary symbols then amino-acids
#[allow(dead_code)]
pub const VOCAB: [&str; 25] = [
    "$", ".", "?", "|", "*", "R", "H", "K", "D", "E", "S", "T", "N", "Q", "C", "G", "P", "A",
    "V", "I", "L", "M", "F", "Y", "W",
];

/// Deterministic extractor: (length, byte sum, first byte) of each sequence
#[allow(dead_code)]
#[derive(Default)]
pub struct MockExtractor {
    pub calls: Cell<usize>,
}

impl EmbeddingExtractor for MockExtractor {
    fn extract(
        &self,
        sequences: &[String],
        _params: &ExtractionParameters,
    ) -> shared::Result<Array2<f64>> {
        self.calls.set(self.calls.get() + 1);
        let mut x = Array2::zeros((sequences.len(), 3));
        for (i, s) in sequences.iter().enumerate() {
            x[[i, 0]] = s.len() as f64;
            x[[i, 1]] = byte_sum(s);
            x[[i, 2]] = s.bytes().next().map(f64::from).unwrap_or(0.);
        }
        Ok(x)
    }
}

/// Extractor losing the last sequence
#[allow(dead_code)]
pub struct TruncatingExtractor;

impl EmbeddingExtractor for TruncatingExtractor {
    fn extract(
        &self,
        sequences: &[String],
        _params: &ExtractionParameters,
    ) -> shared::Result<Array2<f64>> {
        Ok(Array2::zeros((sequences.len().saturating_sub(1), 3)))
    }
}

#[allow(dead_code)]
pub fn byte_sum(s: &str) -> f64 {
    s.bytes().map(f64::from).sum()
}

#[allow(dead_code)]
pub fn write_input(dir: &TempDir, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, content)?;
    Ok(path)
}

#[allow(dead_code)]
pub fn tiny_config() -> Config {
    Config {
        vocab_size: VOCAB.len(),
        hidden_size: 8,
        num_hidden_layers: 2,
        num_attention_heads: 2,
        intermediate_size: 16,
        hidden_act: HiddenAct::Gelu,
        max_position_embeddings: 32,
        type_vocab_size: 2,
        layer_norm_eps: 1e-12,
    }
}

/// Small randomly initialized BERT running on CPU
#[allow(dead_code)]
pub fn tiny_bert() -> Result<BertExtractor> {
    let config = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let encoder = BertEncoder::load(vb, &config)?;
    let tokenizer = ResidueTokenizer::from_tokens(VOCAB)?;
    Ok(BertExtractor::new(encoder, tokenizer, config, Device::Cpu))
}
