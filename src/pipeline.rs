//! The embedding pipeline: read, dedup, validate, embed, assemble, write.
use crate::embedding::EmbeddingExtractor;
use crate::output::{AnnotatedEmbeddingMatrix, Provenance, RowMetadata};
use crate::shared::{
    dedup, filter_valid, read_sequence_file, AssemblyParameters, EmbedError,
    ExtractionParameters, Mode, Result,
};
use log::info;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct EmbedPipeline {
    pub mode: Mode,
    pub extraction: ExtractionParameters,
    pub assembly: AssemblyParameters,
}

impl EmbedPipeline {
    pub fn new(
        mode: Mode,
        extraction: ExtractionParameters,
        assembly: AssemblyParameters,
    ) -> EmbedPipeline {
        EmbedPipeline {
            mode,
            extraction,
            assembly,
        }
    }

    /// Unique sequences of `path` written with the alphabet of the mode,
    /// in order of first appearance.
    pub fn load_sequences(&self, path: &Path) -> Result<Vec<String>> {
        let raw = read_sequence_file(path)?;
        let seqs = filter_valid(dedup(raw), self.mode);
        info!(
            "Read in {} unique valid TCRs from {}",
            seqs.len(),
            path.display()
        );
        if seqs.is_empty() {
            return Err(EmbedError::EmptyInput {
                path: path.to_path_buf(),
            });
        }
        Ok(seqs)
    }

    /// Embed already validated sequences and pair them with their metadata
    pub fn assemble<E: EmbeddingExtractor>(
        &self,
        seqs: &[String],
        extractor: &E,
    ) -> Result<AnnotatedEmbeddingMatrix> {
        let embeddings = extractor.extract(seqs, &self.extraction)?;
        let obs = RowMetadata::from_sequences(seqs, self.mode, &self.assembly);
        AnnotatedEmbeddingMatrix::new(
            embeddings,
            obs,
            self.mode,
            Provenance::from(&self.extraction),
        )
    }

    pub fn run<E: EmbeddingExtractor>(
        &self,
        infile: &Path,
        outfile: &Path,
        extractor: &E,
    ) -> Result<AnnotatedEmbeddingMatrix> {
        let seqs = self.load_sequences(infile)?;
        let matrix = self.assemble(&seqs, extractor)?;
        matrix.write(outfile)?;
        Ok(matrix)
    }
}
