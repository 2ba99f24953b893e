// Reader for the newline-delimited sequence files

use crate::shared::error::{EmbedError, Result};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;

/// Read the sequences stored in `path`, one per line.
/// If the lines are tab-delimited, only the first column is kept.
/// Empty lines and lines starting with `#` are ignored.
pub fn read_sequence_file(path: &Path) -> Result<Vec<String>> {
    let builder = sequence_reader_builder();
    let reader = builder.from_path(path).map_err(|source| EmbedError::InputRead {
        path: path.to_path_buf(),
        source,
    })?;
    collect_first_fields(reader).map_err(|source| EmbedError::InputRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Same as `read_sequence_file`, from any reader (stdin, in-memory buffer...)
pub fn read_sequences<R: Read>(rdr: R) -> std::result::Result<Vec<String>, csv::Error> {
    collect_first_fields(sequence_reader_builder().from_reader(rdr))
}

fn sequence_reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'));
    builder
}

fn collect_first_fields<R: Read>(
    mut reader: csv::Reader<R>,
) -> std::result::Result<Vec<String>, csv::Error> {
    let mut sequences = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        // the first field of "\tTRBV1" is empty
        match record.get(0).map(str::trim) {
            Some(seq) if !seq.is_empty() => sequences.push(seq.to_string()),
            _ => continue,
        }
    }
    Ok(sequences)
}
