//! The structs used for specifying the parameters of a run
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "wukevin/tcr-bert";

/// How the per-residue vectors of a layer are reduced to one vector
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    #[default]
    Mean,
    Max,
    Cls,
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Pooling::Mean => write!(f, "mean"),
            Pooling::Max => write!(f, "max"),
            Pooling::Cls => write!(f, "cls"),
        }
    }
}

impl FromStr for Pooling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Pooling::Mean),
            "max" => Ok(Pooling::Max),
            "cls" => Ok(Pooling::Cls),
            _ => Err(format!(
                "unknown pooling `{}`, expected `mean`, `max` or `cls`",
                s
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExtractionParameters {
    // Local directory or hugging face hub identifier of the model
    pub model: String,
    // Hidden states to use, negative values count from the last layer.
    // When several layers are given their vectors are concatenated.
    pub layers: Vec<i64>,
    pub pooling: Pooling,
    // Index of the GPU to run on, CPU if None or if no GPU is available
    pub device: Option<usize>,
    pub batch_size: usize,
}

impl Default for ExtractionParameters {
    fn default() -> ExtractionParameters {
        ExtractionParameters {
            model: DEFAULT_MODEL.to_string(),
            layers: vec![-1],
            pooling: Pooling::Mean,
            device: None,
            batch_size: 256,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssemblyParameters {
    // If true (default) the chain separator `|` of paired sequences
    // is stored as `+` in the metadata
    pub normalize_pair_separator: bool,
}

impl Default for AssemblyParameters {
    fn default() -> AssemblyParameters {
        AssemblyParameters {
            normalize_pair_separator: true,
        }
    }
}
