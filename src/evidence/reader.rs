/// Evidence table reader
///
/// Tab-separated with a header line. Recognised columns:
/// sample, seqname, position, strand, transposon_feature, transposon_strand,
/// transposon_position, read_name, junction
///
/// Rows without a sample id are attributed to the file stem, so a
/// one-file-per-sample layout needs no sample column.
use crate::error::Error;
use crate::evidence::EvidenceRecord;
use crate::io::tsv_reader;
use std::collections::BTreeMap;
use std::path::Path;

/// All raw evidence rows of one sample.
#[derive(Debug, Clone)]
pub struct SampleEvidence {
    pub sample: String,
    pub records: Vec<EvidenceRecord>,
}

/// Read evidence tables and group rows by sample.
///
/// Samples are returned sorted by id so downstream identities are
/// independent of file order.
pub fn read_evidence_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SampleEvidence>, Error> {
    let mut by_sample: BTreeMap<String, Vec<EvidenceRecord>> = BTreeMap::new();

    for path in paths {
        let path = path.as_ref();
        let default_sample = sample_from_path(path);
        let mut reader = tsv_reader(path, true)?;

        let mut n_rows = 0usize;
        for (row_num, result) in reader.deserialize::<EvidenceRecord>().enumerate() {
            let mut record = result.map_err(|e| {
                Error::Table(format!("{}: row {}: {}", path.display(), row_num + 2, e))
            })?;

            let sample = match record.sample.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => default_sample.clone(),
            };
            record.sample = Some(sample.clone());
            by_sample.entry(sample).or_default().push(record);
            n_rows += 1;
        }

        log::debug!("Read {} evidence rows from {}", n_rows, path.display());
    }

    Ok(by_sample
        .into_iter()
        .map(|(sample, records)| SampleEvidence { sample, records })
        .collect())
}

fn sample_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sample".to_string());
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}
