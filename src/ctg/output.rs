/// Gene ranking output ({prefix}ctg.tsv)
///
/// One row per gene with at least one insertion, ranked by p-value.
/// Missing values (degenerate tests, permutation off) are written as empty
/// fields.
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ctg::engine::{CtgOutcome, GeneCall};
use crate::error::Error;
use crate::io::tsv_writer;

pub const CTG_FILE: &str = "ctg.tsv";

#[derive(Debug, Serialize)]
struct CtgRow<'a> {
    rank: usize,
    gene_id: &'a str,
    gene_name: &'a str,
    seqname: &'a str,
    start: u64,
    end: u64,
    strand: char,
    n_insertions: u64,
    n_samples: usize,
    samples: String,
    sense: usize,
    antisense: usize,
    orientation_bias: Option<String>,
    expected: Option<String>,
    #[serde(rename = "p_value_conditional")]
    p_value: Option<String>,
    q_value: Option<String>,
    perm_p_value: Option<String>,
    significant: bool,
}

fn sci(value: Option<f64>) -> Option<String> {
    value.map(|v| format!("{:.6e}", v))
}

impl<'a> CtgRow<'a> {
    fn from_call(rank: usize, call: &'a GeneCall, fdr_threshold: f64) -> Self {
        Self {
            rank,
            gene_id: &call.gene_id,
            gene_name: call.gene_name.as_deref().unwrap_or("."),
            seqname: &call.seqname,
            start: call.start,
            end: call.end,
            strand: call.strand.map_or('.', |s| s.symbol()),
            n_insertions: call.n_insertions,
            n_samples: call.n_samples(),
            samples: call.samples.join(","),
            sense: call.sense,
            antisense: call.antisense,
            orientation_bias: call.orientation_bias().map(|b| format!("{:.3}", b)),
            expected: sci(call.expected),
            p_value: sci(call.p_value),
            q_value: sci(call.q_value),
            perm_p_value: call.perm_p_value.map(|p| format!("{:.6}", p)),
            significant: call.is_significant(fdr_threshold),
        }
    }
}

/// Write the ranked gene table. Returns the output path.
pub fn write_ctg(outcome: &CtgOutcome, fdr_threshold: f64, prefix: &Path) -> Result<PathBuf, Error> {
    let (mut writer, path) = tsv_writer(prefix, CTG_FILE)?;

    for (i, call) in outcome.calls.iter().enumerate() {
        writer.serialize(CtgRow::from_call(i + 1, call, fdr_threshold))?;
    }
    writer.flush().map_err(|e| Error::io(e, &path))?;

    log::info!(
        "Wrote {} genes ({} with q <= {}) to {}",
        outcome.calls.len(),
        outcome.n_significant(fdr_threshold),
        fdr_threshold,
        path.display()
    );

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctg::calibrate::{BackgroundCalibration, NullModel};
    use crate::evidence::Strand;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn call(gene_id: &str, p: Option<f64>) -> GeneCall {
        GeneCall {
            gene_id: gene_id.to_string(),
            gene_name: None,
            seqname: "chr1".to_string(),
            start: 100,
            end: 200,
            strand: Some(Strand::Reverse),
            samples: vec!["S1".to_string(), "S2".to_string()],
            n_insertions: 2,
            sense: 1,
            antisense: 1,
            expected: p.map(|_| 0.01),
            p_value: p,
            q_value: p,
            perm_p_value: None,
        }
    }

    #[test]
    fn test_write_ctg() {
        let outcome = CtgOutcome {
            calls: vec![call("Myc", Some(0.001)), call("Odd", None)],
            calibration: BackgroundCalibration {
                rate: 1e-6,
                model: NullModel::Poisson,
                dispersion: 1.0,
                n_loci: 10,
                effective_genome: 1e7,
                excluded: BTreeSet::new(),
                rounds: 1,
                flank_window: 0,
            },
            degenerate: Vec::new(),
            n_samples: 2,
            partial: false,
        };

        let dir = tempdir().unwrap();
        let prefix = format!("{}/run_", dir.path().display());
        let path = write_ctg(&outcome, 0.05, Path::new(&prefix)).unwrap();
        assert!(path.ends_with("run_ctg.tsv"));

        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("rank\tgene_id\tgene_name"));
        assert!(lines[0].contains("\texpected\tp_value_conditional\tq_value\t"));
        assert!(lines[1].starts_with("1\tMyc\t.\tchr1\t100\t200\t-\t2\t2\tS1,S2\t1\t1\t0.500\t"));
        assert!(lines[1].ends_with("\ttrue"));
        assert!(lines[2].ends_with("\t\t\t\t\tfalse"));
    }
}
