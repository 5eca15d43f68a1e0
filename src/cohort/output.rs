/// Cohort insertion table output ({prefix}insertions.tsv)
///
/// One row per cohort entry, ordered by merged insertion. Columns:
/// merged_id, sample, call_id, seqname, start, end, strand, gene_id,
/// gene_name, orientation, boundary_distance, support, exact, soft_clipped,
/// spanning, confidence, features, merged_start, merged_end, merged_samples
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cohort::merge::{CohortEntry, CohortTable};
use crate::error::Error;
use crate::evidence::JunctionQuality;
use crate::io::tsv_writer;

pub const INSERTIONS_FILE: &str = "insertions.tsv";

#[derive(Debug, Serialize)]
struct InsertionRow<'a> {
    merged_id: &'a str,
    sample: &'a str,
    call_id: &'a str,
    seqname: &'a str,
    start: u64,
    end: u64,
    strand: char,
    gene_id: &'a str,
    gene_name: &'a str,
    orientation: String,
    boundary_distance: Option<u64>,
    support: usize,
    exact: usize,
    soft_clipped: usize,
    spanning: usize,
    confidence: String,
    features: String,
    merged_start: u64,
    merged_end: u64,
    merged_samples: usize,
}

impl<'a> InsertionRow<'a> {
    fn from_entry(entry: &'a CohortEntry) -> Self {
        let call = &entry.insertion.call;
        let merged = &entry.merged;
        Self {
            merged_id: &merged.id,
            sample: &entry.sample,
            call_id: &call.id,
            seqname: &call.seqname,
            start: call.start,
            end: call.end,
            strand: call.strand.symbol(),
            gene_id: entry.insertion.gene.id(),
            gene_name: entry.insertion.gene.name().unwrap_or("."),
            orientation: entry
                .insertion
                .orientation
                .map_or_else(|| ".".to_string(), |o| o.to_string()),
            boundary_distance: entry.insertion.boundary_distance,
            support: call.support(),
            exact: call.support_of(JunctionQuality::Exact),
            soft_clipped: call.support_of(JunctionQuality::SoftClipped),
            spanning: call.support_of(JunctionQuality::Spanning),
            confidence: format!("{:.4}", call.confidence),
            features: call.feature_list(),
            merged_start: merged.start,
            merged_end: merged.end,
            merged_samples: merged.n_samples(),
        }
    }
}

/// Write the cohort table. Returns the output path.
pub fn write_insertions(table: &CohortTable, prefix: &Path) -> Result<PathBuf, Error> {
    let (mut writer, path) = tsv_writer(prefix, INSERTIONS_FILE)?;

    for entry in &table.entries {
        writer.serialize(InsertionRow::from_entry(entry))?;
    }
    writer.flush().map_err(|e| Error::io(e, &path))?;

    log::info!(
        "Wrote {} cohort entries ({} merged insertions) to {}",
        table.entries.len(),
        table.merged.len(),
        path.display()
    );

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::index::tests::gene;
    use crate::annotation::{AnnotationLinker, GeneIndex};
    use crate::cohort::merge::{CohortMerger, SampleInsertions};
    use crate::evidence::Strand;
    use crate::evidence::tests::record;
    use crate::insertion::InsertionCall;
    use crate::params::{LinkConfig, MergeConfig};
    use tempfile::tempdir;

    #[test]
    fn test_write_insertions() {
        let idx = GeneIndex::new(vec![gene("G1", "chr2", 900, 1_200, Strand::Forward)]);
        let cfg = LinkConfig::new(0);
        let linker = AnnotationLinker::new(&idx, &cfg);

        let inputs = [("S1", 1_000), ("S2", 1_050), ("S3", 5_000)]
            .iter()
            .map(|&(sample, pos)| {
                let ev = record("chr2", pos, "+", "r1").validate().unwrap();
                let call = InsertionCall::from_cluster(format!("{sample}.INS_1"), sample, vec![ev]).unwrap();
                SampleInsertions {
                    sample: sample.to_string(),
                    insertions: linker.link_calls(vec![call]).annotated,
                }
            })
            .collect();
        let table = CohortMerger::new(MergeConfig { tolerance: 200 }).merge(inputs, None);

        let dir = tempdir().unwrap();
        let prefix = format!("{}/", dir.path().display());
        let path = write_insertions(&table, Path::new(&prefix)).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("merged_id\tsample\tcall_id"));
        assert!(lines[1].starts_with("MI_1\tS1\tS1.INS_1\tchr2\t1000\t1000\t+\tG1\tG1_name\tsense"));
        assert!(lines[2].starts_with("MI_1\tS2\t"));
        assert!(lines[3].starts_with("MI_2\tS3\tS3.INS_1\tchr2\t5000\t5000\t+\tunassigned\t.\t.\t\t1\t1\t0\t0"));
    }
}
