//! Residue-level tokenizer: every amino-acid (or auxiliary symbol) is one token
use crate::shared::sequence::{CLS, PAD, SEP, UNK};
use anyhow::{anyhow, Context, Result};
use foldhash::fast::RandomState;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct ResidueTokenizer {
    ids: HashMap<String, u32, RandomState>,
    cls_id: u32,
    sep_id: u32,
    pad_id: u32,
    unk_id: Option<u32>,
}

impl ResidueTokenizer {
    /// Load a `vocab.txt` file (one token per line, the line number is the id)
    pub fn from_file(path: &Path) -> Result<ResidueTokenizer> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Cannot read vocabulary {:?}", path))?;
        ResidueTokenizer::from_tokens(content.lines().map(str::trim_end))
    }

    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<ResidueTokenizer> {
        let ids: HashMap<String, u32, RandomState> = tokens
            .into_iter()
            .enumerate()
            .map(|(id, tok)| (tok.to_string(), id as u32))
            .collect();

        // the symbols of the TCR vocabulary, or the usual BERT names
        let special = |symbol: u8, name: &str| {
            ids.get(&(symbol as char).to_string())
                .or_else(|| ids.get(name))
                .copied()
        };
        Ok(ResidueTokenizer {
            cls_id: special(CLS, "[CLS]").ok_or(anyhow!("No class token in the vocabulary"))?,
            sep_id: special(SEP, "[SEP]")
                .ok_or(anyhow!("No separator token in the vocabulary"))?,
            pad_id: special(PAD, "[PAD]").ok_or(anyhow!("No padding token in the vocabulary"))?,
            unk_id: special(UNK, "[UNK]"),
            ids,
        })
    }

    /// `[CLS] r_1 ... r_n [SEP]`
    pub fn encode(&self, seq: &str) -> Result<Vec<u32>> {
        if seq.is_empty() {
            return Err(anyhow!("Cannot encode an empty sequence"));
        }
        let mut encoded = Vec::with_capacity(seq.len() + 2);
        encoded.push(self.cls_id);
        let mut buf = [0u8; 4];
        for c in seq.chars() {
            let id = match self.ids.get(c.encode_utf8(&mut buf) as &str) {
                Some(&id) => id,
                None => self
                    .unk_id
                    .ok_or_else(|| anyhow!("Symbol {} of {} is not in the vocabulary", c, seq))?,
            };
            encoded.push(id);
        }
        encoded.push(self.sep_id);
        Ok(encoded)
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn vocab_size(&self) -> usize {
        self.ids.len()
    }
}
