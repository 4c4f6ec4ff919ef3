use crate::api::{ApiResult, SkewError};
use crate::types::GenomeRecord;
use bio::io::fasta;
use niffler::get_reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads every entry of a (possibly compressed) multi-FASTA file into a
/// pre-populated record named after the entry id.
pub fn load_records(path: &Path) -> ApiResult<Vec<GenomeRecord>> {
    let file = File::open(path)
        .map_err(|e| SkewError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
    let (inner_reader, _compression) = get_reader(Box::new(file))
        .map_err(|e| SkewError::DecodeError(format!("{}: {}", path.display(), e)))?;
    let reader = fasta::Reader::new(BufReader::with_capacity(16 * 1024 * 1024, inner_reader));

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| SkewError::DecodeError(e.to_string()))?;
        let sequence = std::str::from_utf8(record.seq())
            .map_err(|e| SkewError::DecodeError(format!("{}: {}", record.id(), e)))?;
        records.push(GenomeRecord::from_sequence(record.id(), sequence));
    }

    if records.is_empty() {
        return Err(SkewError::DecodeError(format!(
            "{}: no FASTA records",
            path.display()
        )));
    }
    log::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
