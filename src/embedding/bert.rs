//! BERT encoder returning every hidden state, and the extractor built on it.
//!
//! The weights follow the hugging face `BertModel` naming, with or without the
//! `bert.` prefix of the task-specific checkpoints (masked LM, classification).
use super::loader::{load_device, ModelFiles};
use super::tokenizer::ResidueTokenizer;
use super::EmbeddingExtractor;
use crate::shared::{self, EmbedError, ExtractionParameters, Pooling};
use anyhow::Context;
use candle_core::{DType, Device, Module, Result, Tensor, D};
use candle_nn::{embedding, layer_norm, linear, ops::softmax, Embedding, LayerNorm, Linear, VarBuilder};
use log::{debug, info};
use ndarray::Array2;
use serde::Deserialize;
use std::iter::repeat;

#[cfg(feature = "kdam")]
use kdam::BarExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HiddenAct {
    #[default]
    Gelu,
    #[serde(rename = "gelu_new")]
    GeluNew,
    Relu,
}

impl HiddenAct {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            HiddenAct::Gelu => xs.gelu_erf(),
            HiddenAct::GeluNew => xs.gelu(),
            HiddenAct::Relu => xs.relu(),
        }
    }
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

/// The subset of `config.json` needed to rebuild the encoder
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default)]
    pub hidden_act: HiddenAct,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

#[derive(Debug, Clone)]
struct Embeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        Ok(Self {
            word_embeddings: embedding(
                config.vocab_size,
                config.hidden_size,
                vb.pp("word_embeddings"),
            )?,
            position_embeddings: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type_embeddings: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        let positions = Tensor::arange(0u32, seq_len as u32, input_ids.device())?;
        // single segment: every token type is 0
        let token_types = input_ids.zeros_like()?;
        let xs = self
            .word_embeddings
            .forward(input_ids)?
            .broadcast_add(&self.position_embeddings.forward(&positions)?)?
            .add(&self.token_type_embeddings.forward(&token_types)?)?;
        self.layer_norm.forward(&xs)
    }
}

#[derive(Debug, Clone)]
struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_attention_heads: usize,
    attention_head_size: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let hidden = config.hidden_size;
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("query"))?,
            key: linear(hidden, hidden, vb.pp("key"))?,
            value: linear(hidden, hidden, vb.pp("value"))?,
            num_attention_heads: config.num_attention_heads,
            attention_head_size: hidden / config.num_attention_heads,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden_size) = hidden_states.dims3()?;
        let heads = |xs: Tensor| -> Result<Tensor> {
            xs.reshape((
                batch,
                seq_len,
                self.num_attention_heads,
                self.attention_head_size,
            ))?
            .transpose(1, 2)?
            .contiguous()
        };
        let q = heads(self.query.forward(hidden_states)?)?;
        let k = heads(self.key.forward(hidden_states)?)?;
        let v = heads(self.value.forward(hidden_states)?)?;

        let scale = (self.attention_head_size as f64).powf(-0.5);
        let scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let scores = scores.broadcast_add(attention_mask)?;
        let probs = softmax(&scores, D::Minus1)?;

        probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, hidden_size))
    }
}

#[derive(Debug, Clone)]
struct Layer {
    attention: SelfAttention,
    attention_output: Linear,
    attention_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
    hidden_act: HiddenAct,
}

impl Layer {
    fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let hidden = config.hidden_size;
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: SelfAttention::load(vb.pp("attention").pp("self"), config)?,
            attention_output: linear(hidden, hidden, vb.pp("attention.output.dense"))?,
            attention_norm: layer_norm(hidden, eps, vb.pp("attention.output.LayerNorm"))?,
            intermediate: linear(
                hidden,
                config.intermediate_size,
                vb.pp("intermediate.dense"),
            )?,
            output: linear(config.intermediate_size, hidden, vb.pp("output.dense"))?,
            output_norm: layer_norm(hidden, eps, vb.pp("output.LayerNorm"))?,
            hidden_act: config.hidden_act,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(hidden_states, attention_mask)?;
        let attended = self
            .attention_norm
            .forward(&self.attention_output.forward(&attended)?.add(hidden_states)?)?;
        let intermediate = self
            .hidden_act
            .forward(&self.intermediate.forward(&attended)?)?;
        self.output_norm
            .forward(&self.output.forward(&intermediate)?.add(&attended)?)
    }
}

#[derive(Debug, Clone)]
pub struct BertEncoder {
    embeddings: Embeddings,
    layers: Vec<Layer>,
}

impl BertEncoder {
    pub fn load(vb: VarBuilder, config: &Config) -> Result<Self> {
        let vb = if vb.contains_tensor("embeddings.word_embeddings.weight") {
            vb
        } else {
            vb.pp("bert")
        };
        let layers = (0..config.num_hidden_layers)
            .map(|i| Layer::load(vb.pp(format!("encoder.layer.{i}")), config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            embeddings: Embeddings::load(vb.pp("embeddings"), config)?,
            layers,
        })
    }

    /// Output of the embedding layer followed by the output of every layer,
    /// each of shape (batch, seq_len, hidden_size).
    /// `attention_mask` is 1 for real tokens and 0 for padding.
    pub fn hidden_states(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Vec<Tensor>> {
        // (batch, 1, 1, seq_len), 0 for tokens, -10000 for padding
        let mask = attention_mask
            .to_dtype(DType::F32)?
            .affine(10000.0, -10000.0)?
            .unsqueeze(1)?
            .unsqueeze(1)?;

        let mut states = Vec::with_capacity(self.layers.len() + 1);
        let mut xs = self.embeddings.forward(input_ids)?;
        for layer in &self.layers {
            let next = layer.forward(&xs, &mask)?;
            states.push(xs);
            xs = next;
        }
        states.push(xs);
        Ok(states)
    }
}

/// Embedding extractor running a BERT model on the residue tokens
pub struct BertExtractor {
    encoder: BertEncoder,
    tokenizer: ResidueTokenizer,
    config: Config,
    device: Device,
}

impl BertExtractor {
    /// Load the model from a local directory or the hugging face hub
    pub fn load(model: &str, device: Option<usize>) -> shared::Result<BertExtractor> {
        let device = load_device(device);
        let files = ModelFiles::resolve(model).map_err(EmbedError::model_load)?;

        let config_content = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read config file {:?}", files.config))
            .map_err(EmbedError::model_load)?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file {:?}", files.config))
            .map_err(EmbedError::model_load)?;

        let tokenizer =
            ResidueTokenizer::from_file(&files.vocab).map_err(EmbedError::model_load)?;
        let vb = files.var_builder(&device).map_err(EmbedError::model_load)?;
        let encoder = BertEncoder::load(vb, &config).map_err(EmbedError::model_load)?;
        info!(
            "Loaded {} ({} layers, hidden size {}) on {:?}",
            model, config.num_hidden_layers, config.hidden_size, device
        );
        Ok(BertExtractor::new(encoder, tokenizer, config, device))
    }

    pub fn new(
        encoder: BertEncoder,
        tokenizer: ResidueTokenizer,
        config: Config,
        device: Device,
    ) -> BertExtractor {
        BertExtractor {
            encoder,
            tokenizer,
            config,
            device,
        }
    }

    /// Number of hidden states a layer can be selected from
    pub fn num_hidden_states(&self) -> usize {
        self.config.num_hidden_layers + 1
    }

    /// Negative indices count from the end: -1 is the last layer, 0 the embedding layer
    pub fn resolve_layer(&self, layer: i64) -> shared::Result<usize> {
        let available = self.num_hidden_states();
        let idx = if layer < 0 {
            available as i64 + layer
        } else {
            layer
        };
        if idx < 0 || idx >= available as i64 {
            return Err(EmbedError::LayerOutOfRange { layer, available });
        }
        Ok(idx as usize)
    }

    fn embed_batch(
        &self,
        batch: &[String],
        layers: &[usize],
        pooling: Pooling,
    ) -> anyhow::Result<Vec<Vec<f64>>> {
        let encoded = batch
            .iter()
            .map(|s| self.tokenizer.encode(s))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let max_len = encoded.iter().map(Vec::len).max().unwrap_or(0);
        if max_len > self.config.max_position_embeddings {
            anyhow::bail!(
                "Sequence of {} tokens exceeds the model limit of {} positions",
                max_len,
                self.config.max_position_embeddings
            );
        }

        let mut ids = Vec::with_capacity(batch.len() * max_len);
        let mut mask = Vec::with_capacity(batch.len() * max_len);
        for tokens in &encoded {
            let padding = max_len - tokens.len();
            ids.extend(tokens.iter().copied().chain(repeat(self.tokenizer.pad_id()).take(padding)));
            mask.extend(repeat(1u32).take(tokens.len()).chain(repeat(0u32).take(padding)));
        }
        let input_ids = Tensor::from_vec(ids, (batch.len(), max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch.len(), max_len), &self.device)?;

        let states = self.encoder.hidden_states(&input_ids, &attention_mask)?;
        let selected = layers
            .iter()
            .map(|&l| states[l].to_dtype(DType::F32)?.to_vec3::<f32>())
            .collect::<Result<Vec<_>>>()?;

        Ok(encoded
            .iter()
            .enumerate()
            .map(|(i, tokens)| {
                // the residues sit between the class and separator tokens
                let residues = tokens.len() - 2;
                selected
                    .iter()
                    .flat_map(|layer| pool(&layer[i], residues, pooling))
                    .collect::<Vec<f64>>()
            })
            .collect())
    }
}

/// Reduce the token vectors of one sequence to a single vector
fn pool(tokens: &[Vec<f32>], residues: usize, pooling: Pooling) -> Vec<f64> {
    match pooling {
        Pooling::Cls => tokens[0].iter().map(|&x| x as f64).collect(),
        Pooling::Mean => {
            let mut acc = vec![0.; tokens[0].len()];
            for tok in &tokens[1..=residues] {
                for (a, &x) in acc.iter_mut().zip(tok) {
                    *a += x as f64;
                }
            }
            acc.iter().map(|a| a / residues as f64).collect()
        }
        Pooling::Max => {
            let mut acc = vec![f64::NEG_INFINITY; tokens[0].len()];
            for tok in &tokens[1..=residues] {
                for (a, &x) in acc.iter_mut().zip(tok) {
                    *a = a.max(x as f64);
                }
            }
            acc
        }
    }
}

impl EmbeddingExtractor for BertExtractor {
    fn extract(
        &self,
        sequences: &[String],
        params: &ExtractionParameters,
    ) -> shared::Result<Array2<f64>> {
        let layers = params
            .layers
            .iter()
            .map(|&l| self.resolve_layer(l))
            .collect::<shared::Result<Vec<_>>>()?;
        if layers.is_empty() {
            return Err(EmbedError::Inference("no layer selected".to_string()));
        }
        let width = layers.len() * self.config.hidden_size;
        let batch_size = params.batch_size.max(1);
        debug!(
            "Embedding {} sequences, layers {:?}, {} pooling, batches of {}",
            sequences.len(),
            layers,
            params.pooling,
            batch_size
        );

        #[cfg(feature = "kdam")]
        let mut pb = kdam::tqdm!(
            total = sequences.len().div_ceil(batch_size),
            desc = "Embedding",
            unit = "batch"
        );

        let mut data = Vec::with_capacity(sequences.len() * width);
        for batch in sequences.chunks(batch_size) {
            let rows = self
                .embed_batch(batch, &layers, params.pooling)
                .map_err(EmbedError::inference)?;
            data.extend(rows.into_iter().flatten());
            #[cfg(feature = "kdam")]
            if let Err(e) = pb.update(1) {
                debug!("Cannot draw the progress bar: {}", e);
            }
        }
        Array2::from_shape_vec((sequences.len(), width), data).map_err(EmbedError::inference)
    }
}
