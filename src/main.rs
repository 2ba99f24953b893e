//! Embed TCR sequences with a pretrained model
//!
//! Reads one sequence per line (first column of tab-delimited files), keeps the
//! unique valid ones and writes their embeddings with the sequences as row
//! metadata.
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tcr_embed::{
    AssemblyParameters, BertExtractor, EmbedPipeline, ExtractionParameters, Mode, Pooling,
    DEFAULT_MODEL,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "tcr-embed", version, about)]
struct Cli {
    /// Input file. If column-delimited, assume first column is sequences
    infile: PathBuf,

    /// Output file to write
    outfile: PathBuf,

    /// Input TRB (B) or TRA/TRB pairs (AB)
    #[arg(short, long, default_value = "B")]
    mode: Mode,

    /// Path to transformer or huggingface model identifier
    #[arg(long, default_value = DEFAULT_MODEL)]
    transformer: String,

    /// Transformer layer to use
    #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
    layer: i64,

    /// GPU to run on. If not given or no GPU available, default to CPU
    #[arg(short, long)]
    gpu: Option<usize>,

    /// Reduction of the residue vectors (mean, max or cls)
    #[arg(short, long, default_value = "mean")]
    pooling: Pooling,

    /// Number of sequences given to the model at once
    #[arg(short, long, default_value_t = 256)]
    batch_size: usize,

    /// Store paired chains as TRA|TRB instead of TRA+TRB
    #[arg(long)]
    keep_pair_separator: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let pipeline = EmbedPipeline::new(
        cli.mode,
        ExtractionParameters {
            model: cli.transformer,
            layers: vec![cli.layer],
            pooling: cli.pooling,
            device: cli.gpu,
            batch_size: cli.batch_size,
        },
        AssemblyParameters {
            normalize_pair_separator: !cli.keep_pair_separator,
        },
    );

    // read the input before paying for the model
    let seqs = pipeline
        .load_sequences(&cli.infile)
        .with_context(|| format!("Cannot embed {}", cli.infile.display()))?;
    let extractor = BertExtractor::load(&pipeline.extraction.model, pipeline.extraction.device)?;
    let matrix = pipeline.assemble(&seqs, &extractor)?;
    matrix.write(&cli.outfile)?;
    Ok(())
}
