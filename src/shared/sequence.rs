//! Sequence alphabets and the mode-dependent vocabulary filter
use log::debug;
use phf::phf_set;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The 20 standard amino-acids, in the order used by the model vocabulary
pub const AMINO_ACIDS: &str = "RHKDESTNQCGPAVILMFYW";

// Auxiliary symbols of the model vocabulary
pub const PAD: u8 = b'$';
pub const MASK: u8 = b'.';
pub const UNK: u8 = b'?';
pub const SEP: u8 = b'|';
pub const CLS: u8 = b'*';

static AMINO_ACIDS_SET: phf::Set<u8> = phf_set! {
    b'R', b'H', b'K', b'D', b'E', b'S', b'T', b'N', b'Q', b'C',
    b'G', b'P', b'A', b'V', b'I', b'L', b'M', b'F', b'Y', b'W',
};

// amino-acids + pad, mask, unknown, chain separator and class token
static AMINO_ACIDS_WITH_ALL_ADDITIONAL_SET: phf::Set<u8> = phf_set! {
    b'R', b'H', b'K', b'D', b'E', b'S', b'T', b'N', b'Q', b'C',
    b'G', b'P', b'A', b'V', b'I', b'L', b'M', b'F', b'Y', b'W',
    b'$', b'.', b'?', b'|', b'*',
};

/// Kind of receptor sequence given as input.
/// `SingleChain` is a TRB junction, `PairedChain` is a TRA/TRB pair
/// written `TRA|TRB`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    #[serde(rename = "B")]
    SingleChain,
    #[serde(rename = "AB")]
    PairedChain,
}

impl Mode {
    pub fn alphabet(&self) -> &'static phf::Set<u8> {
        match self {
            Mode::SingleChain => &AMINO_ACIDS_SET,
            Mode::PairedChain => &AMINO_ACIDS_WITH_ALL_ADDITIONAL_SET,
        }
    }

    /// Name of the single metadata column stored next to the embeddings
    pub fn metadata_column(&self) -> &'static str {
        match self {
            Mode::SingleChain => "IR_VDJ_1_junction_aa",
            Mode::PairedChain => "TRA+TRB",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::SingleChain => write!(f, "B"),
            Mode::PairedChain => write!(f, "AB"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "B" => Ok(Mode::SingleChain),
            "AB" => Ok(Mode::PairedChain),
            _ => Err(format!("unknown mode `{}`, expected `B` or `AB`", s)),
        }
    }
}

/// True if every symbol of `seq` belongs to `vocab`
pub fn adheres_to_vocab(seq: &str, vocab: &phf::Set<u8>) -> bool {
    seq.bytes().all(|b| vocab.contains(&b))
}

/// Keep the sequences written with the alphabet of `mode`, in their original order.
/// Invalid sequences are dropped without error.
pub fn filter_valid(seqs: Vec<String>, mode: Mode) -> Vec<String> {
    let total = seqs.len();
    let vocab = mode.alphabet();
    let valid: Vec<String> = seqs
        .into_iter()
        .filter(|s| adheres_to_vocab(s, vocab))
        .collect();
    debug!(
        "Rejected {} sequences outside the {} alphabet",
        total - valid.len(),
        mode
    );
    valid
}
