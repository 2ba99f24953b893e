use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{array, Array2};
use std::fs::{self, File};
use std::io::Write;
use tcr_embed::{
    AnnotatedEmbeddingMatrix, AssemblyParameters, EmbedError, ExtractionParameters, Mode,
    Provenance, RowMetadata,
};
use tempfile::tempdir;

fn seqs(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn provenance() -> Provenance {
    Provenance::from(&ExtractionParameters::default())
}

#[test]
fn metadata_schema_depends_on_mode() {
    let params = AssemblyParameters::default();
    let single = RowMetadata::from_sequences(&seqs(&["CASSL", "CASSY"]), Mode::SingleChain, &params);
    assert_eq!(single.column, "IR_VDJ_1_junction_aa");
    assert_eq!(single.values, vec!["CASSL", "CASSY"]);

    let paired = RowMetadata::from_sequences(&seqs(&["CAV|CASSL|X"]), Mode::PairedChain, &params);
    assert_eq!(paired.column, "TRA+TRB");
    assert_eq!(paired.values, vec!["CAV+CASSL+X"]);
}

#[test]
fn rows_must_match_metadata() {
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL", "CASSY"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    let err = AnnotatedEmbeddingMatrix::new(Array2::zeros((3, 4)), obs, Mode::SingleChain, provenance())
        .unwrap_err();
    assert!(matches!(
        err,
        EmbedError::ShapeMismatch {
            vectors: 3,
            metadata: 2
        }
    ));
}

#[test]
fn write_then_load_is_lossless() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("embeddings.json.gz");
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL|CASSY", "CAVR|CASSPDR"]),
        Mode::PairedChain,
        &AssemblyParameters::default(),
    );
    let x = array![
        [0.1, -2.5e-8, 1.0 / 3.0, std::f64::consts::PI],
        [f64::MAX, f64::MIN_POSITIVE, -0.0, 123456.789]
    ];
    let matrix = AnnotatedEmbeddingMatrix::new(x, obs, Mode::PairedChain, provenance())?;
    matrix.write(&path)?;

    let loaded = AnnotatedEmbeddingMatrix::load(&path)?;
    assert_eq!(loaded, matrix);
    assert_eq!(loaded.x.shape(), &[2, 4]);
    assert_eq!(loaded.obs.values, vec!["CASSL+CASSY", "CAVR+CASSPDR"]);
    Ok(())
}

#[test]
fn output_is_gzip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("out.gz");
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    AnnotatedEmbeddingMatrix::new(array![[1.0, 2.0]], obs, Mode::SingleChain, provenance())?
        .write(&path)?;
    let bytes = fs::read(&path)?;
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    Ok(())
}

#[test]
fn failed_write_leaves_nothing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("missing_dir").join("out.json.gz");
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    let matrix = AnnotatedEmbeddingMatrix::new(array![[1.0]], obs, Mode::SingleChain, provenance())?;
    let err = matrix.write(&path).unwrap_err();
    assert!(matches!(err, EmbedError::OutputWrite { .. }));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn overwrite_existing_output() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("out.json.gz");
    fs::write(&path, "previous run")?;
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    let matrix = AnnotatedEmbeddingMatrix::new(array![[1.0]], obs, Mode::SingleChain, provenance())?;
    matrix.write(&path)?;
    assert_eq!(AnnotatedEmbeddingMatrix::load(&path)?, matrix);
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn load_rejects_foreign_files() -> Result<()> {
    let dir = tempdir()?;
    let plain = dir.path().join("plain.txt");
    fs::write(&plain, "CASSL\n")?;
    assert!(matches!(
        AnnotatedEmbeddingMatrix::load(&plain).unwrap_err(),
        EmbedError::OutputRead { .. }
    ));

    let other = dir.path().join("other.json.gz");
    let mut encoder = GzEncoder::new(File::create(&other)?, Compression::default());
    encoder.write_all(br#"{"format": "something-else", "version": 1, "matrix": null}"#)?;
    encoder.finish()?;
    assert!(matches!(
        AnnotatedEmbeddingMatrix::load(&other).unwrap_err(),
        EmbedError::OutputRead { .. }
    ));
    Ok(())
}

#[test]
fn non_finite_values_are_rejected() -> Result<()> {
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    let err = AnnotatedEmbeddingMatrix::new(
        array![[0.5, f64::NAN, f64::INFINITY]],
        obs.clone(),
        Mode::SingleChain,
        provenance(),
    )
    .unwrap_err();
    assert!(matches!(err, EmbedError::NonFiniteValue { row: 0, col: 1, .. }));

    // the fields are public, write checks again
    let dir = tempdir()?;
    let path = dir.path().join("out.json.gz");
    let mut matrix =
        AnnotatedEmbeddingMatrix::new(array![[0.5, 1.0]], obs, Mode::SingleChain, provenance())?;
    matrix.x[[0, 1]] = f64::NEG_INFINITY;
    assert!(matches!(
        matrix.write(&path).unwrap_err(),
        EmbedError::NonFiniteValue { row: 0, col: 1, .. }
    ));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[cfg(unix)]
#[test]
fn output_permissions_follow_umask() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let obs = RowMetadata::from_sequences(
        &seqs(&["CASSL"]),
        Mode::SingleChain,
        &AssemblyParameters::default(),
    );
    let matrix = AnnotatedEmbeddingMatrix::new(array![[1.0]], obs, Mode::SingleChain, provenance())?;

    let reference = dir.path().join("reference.txt");
    fs::write(&reference, "CASSL\n")?;
    let path = dir.path().join("new.json.gz");
    matrix.write(&path)?;
    let mode = |p: &std::path::Path| -> Result<u32> {
        Ok(fs::metadata(p)?.permissions().mode() & 0o777)
    };
    assert_eq!(mode(&path)?, mode(&reference)?);

    // an existing output keeps its mode
    let existing = dir.path().join("existing.json.gz");
    fs::write(&existing, "previous run")?;
    fs::set_permissions(&existing, fs::Permissions::from_mode(0o640))?;
    matrix.write(&existing)?;
    assert_eq!(mode(&existing)?, 0o640);
    Ok(())
}
