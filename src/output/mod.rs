//! Assembly of the annotated embedding matrix and its persistence.
//!
//! The file is a gzip-compressed JSON document holding the matrix (one row per
//! sequence), a one-column metadata table whose schema depends on the [`Mode`],
//! and the provenance of the embeddings.
use crate::shared::{AssemblyParameters, EmbedError, ExtractionParameters, Mode, Pooling, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

pub const FORMAT_NAME: &str = "tcr-embed/annotated-matrix";
pub const FORMAT_VERSION: u32 = 1;

/// Row metadata: one value per row of the matrix, under a single column
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RowMetadata {
    pub column: String,
    pub values: Vec<String>,
}

impl RowMetadata {
    /// Build the metadata of the validated sequences.
    /// Paired chains `TRA|TRB` are stored as `TRA+TRB` unless
    /// `normalize_pair_separator` is false.
    pub fn from_sequences(seqs: &[String], mode: Mode, params: &AssemblyParameters) -> RowMetadata {
        let values = match mode {
            Mode::SingleChain => seqs.to_vec(),
            Mode::PairedChain if params.normalize_pair_separator => {
                seqs.iter().map(|s| s.replace('|', "+")).collect()
            }
            Mode::PairedChain => seqs.to_vec(),
        };
        RowMetadata {
            column: mode.metadata_column().to_string(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How the embeddings were produced
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Provenance {
    pub model: String,
    pub layers: Vec<i64>,
    pub pooling: Pooling,
}

impl From<&ExtractionParameters> for Provenance {
    fn from(params: &ExtractionParameters) -> Provenance {
        Provenance {
            model: params.model.clone(),
            layers: params.layers.clone(),
            pooling: params.pooling,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnnotatedEmbeddingMatrix {
    pub mode: Mode,
    pub provenance: Provenance,
    pub obs: RowMetadata,
    #[serde(rename = "X")]
    pub x: Array2<f64>,
}

#[derive(Serialize)]
struct FileView<'a> {
    format: &'a str,
    version: u32,
    matrix: &'a AnnotatedEmbeddingMatrix,
}

#[derive(Deserialize)]
struct FileContent {
    format: String,
    version: u32,
    matrix: AnnotatedEmbeddingMatrix,
}

impl AnnotatedEmbeddingMatrix {
    /// Pair the embeddings with their metadata, row `i` of `x` must describe
    /// `obs.values[i]`.
    pub fn new(
        x: Array2<f64>,
        obs: RowMetadata,
        mode: Mode,
        provenance: Provenance,
    ) -> Result<AnnotatedEmbeddingMatrix> {
        check_shape(&x, &obs)?;
        check_finite(&x)?;
        Ok(AnnotatedEmbeddingMatrix {
            mode,
            provenance,
            obs,
            x,
        })
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Write the matrix to `path`. The data goes to a temporary file of the
    /// same directory first, `path` only appears once the write is complete.
    /// A new file gets the usual permissions of the process umask, an existing
    /// one keeps its own.
    pub fn write(&self, path: &Path) -> Result<()> {
        check_shape(&self.x, &self.obs)?;
        // JSON has no NaN or infinity, they would come back as null
        check_finite(&self.x)?;
        let write_error = |source: io::Error| EmbedError::OutputWrite {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = create_temp(dir).map_err(write_error)?;
        if let Ok(meta) = fs::metadata(path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(write_error)?;
        }
        let mut encoder = GzEncoder::new(BufWriter::new(tmp), Compression::default());
        let view = FileView {
            format: FORMAT_NAME,
            version: FORMAT_VERSION,
            matrix: self,
        };
        serde_json::to_writer(&mut encoder, &view).map_err(|e| write_error(e.into()))?;
        let tmp = encoder
            .finish()
            .map_err(write_error)?
            .into_inner()
            .map_err(|e| write_error(e.into_error()))?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(path).map_err(|e| write_error(e.error))?;

        info!(
            "Wrote {} x {} embedding matrix to {}",
            self.nrows(),
            self.ncols(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<AnnotatedEmbeddingMatrix> {
        let read_error = |source: io::Error| EmbedError::OutputRead {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_error)?;
        let content: FileContent =
            serde_json::from_reader(GzDecoder::new(BufReader::new(file)))
                .map_err(|e| read_error(e.into()))?;
        if content.format != FORMAT_NAME || content.version != FORMAT_VERSION {
            return Err(read_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unsupported format {} version {}",
                    content.format, content.version
                ),
            )));
        }
        check_shape(&content.matrix.x, &content.matrix.obs)?;
        Ok(content.matrix)
    }
}

#[cfg(unix)]
fn create_temp(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    // 0o666 is masked by the umask on creation, as for `File::create`
    Builder::new()
        .prefix(".tcr-embed")
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn create_temp(dir: &Path) -> io::Result<NamedTempFile> {
    Builder::new().prefix(".tcr-embed").tempfile_in(dir)
}

fn check_finite(x: &Array2<f64>) -> Result<()> {
    if let Some(((row, col), &value)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(EmbedError::NonFiniteValue { row, col, value });
    }
    Ok(())
}

fn check_shape(x: &Array2<f64>, obs: &RowMetadata) -> Result<()> {
    if x.nrows() != obs.len() {
        return Err(EmbedError::ShapeMismatch {
            vectors: x.nrows(),
            metadata: obs.len(),
        });
    }
    Ok(())
}
