// Per-sample insertion clustering

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::evidence::{Evidence, EvidenceRecord};
use crate::insertion::call::InsertionCall;
use crate::params::ClusterConfig;

/// Cooperative cancellation flag for one sample's processing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Result of clustering one sample.
#[derive(Debug, Default)]
pub struct ClusterOutcome {
    pub calls: Vec<InsertionCall>,
    /// Records that passed validation and the feature filter.
    pub n_evidence: usize,
    /// One entry per rejected record.
    pub validation_errors: Vec<Error>,
    /// Records dropped because their transposon feature is not allowed.
    pub n_feature_filtered: usize,
}

/// Groups junction evidence into insertion calls.
pub struct InsertionClusterer<'a> {
    config: &'a ClusterConfig,
}

impl<'a> InsertionClusterer<'a> {
    pub fn new(config: &'a ClusterConfig) -> Self {
        Self { config }
    }

    /// Cluster one sample's evidence.
    ///
    /// Records are validated one by one; a malformed record is reported in
    /// `validation_errors` and clustering continues with the rest. Valid
    /// evidence is sorted by (chromosome, strand, position) and swept: a
    /// record joins the open cluster when it is on the same chromosome and
    /// strand and at most `max_distance` past the previous record.
    pub fn cluster_sample(
        &self,
        sample: &str,
        records: &[EvidenceRecord],
        cancel: &CancelToken,
    ) -> Result<ClusterOutcome, Error> {
        let mut outcome = ClusterOutcome::default();
        let mut valid: Vec<Evidence> = Vec::with_capacity(records.len());

        for record in records {
            match record.validate() {
                Ok(evidence) => {
                    if self.feature_allowed(&evidence) {
                        valid.push(evidence);
                    } else {
                        outcome.n_feature_filtered += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Sample {}: skipping evidence: {}", sample, e);
                    outcome.validation_errors.push(e);
                }
            }
        }
        outcome.n_evidence = valid.len();

        valid.sort_by(|a, b| {
            a.sort_key()
                .cmp(&b.sort_key())
                .then_with(|| a.read_name.cmp(&b.read_name))
        });

        let mut clusters: Vec<Vec<Evidence>> = Vec::new();
        let mut current: Vec<Evidence> = Vec::new();

        for evidence in valid {
            if cancel.is_cancelled() {
                return Err(Error::Aborted {
                    sample: sample.to_string(),
                });
            }

            if let Some(last) = current.last() {
                if !self.joins(last, &evidence) {
                    clusters.push(std::mem::take(&mut current));
                }
            }
            current.push(evidence);
        }
        if !current.is_empty() {
            clusters.push(current);
        }

        outcome.calls = clusters
            .into_iter()
            .enumerate()
            .filter_map(|(i, members)| {
                InsertionCall::from_cluster(format!("{}.INS_{}", sample, i + 1), sample, members)
            })
            .collect();

        log::debug!(
            "Sample {}: {} evidence records -> {} insertion calls ({} rejected)",
            sample,
            outcome.n_evidence,
            outcome.calls.len(),
            outcome.validation_errors.len()
        );

        Ok(outcome)
    }

    fn feature_allowed(&self, evidence: &Evidence) -> bool {
        self.config.transposon_features.is_empty()
            || self
                .config
                .transposon_features
                .iter()
                .any(|f| f == &evidence.transposon.feature)
    }

    /// Whether `next` extends the cluster whose last member is `last`.
    /// Input is sorted, so `next.position >= last.position` on a match.
    fn joins(&self, last: &Evidence, next: &Evidence) -> bool {
        last.seqname == next.seqname
            && last.strand == next.strand
            && next.position - last.position <= self.config.max_distance
    }
}

/// Drop calls with fewer than `min_evidence` supporting records.
///
/// Returns the kept calls and the number removed.
pub fn filter_min_support(calls: Vec<InsertionCall>, min_evidence: usize) -> (Vec<InsertionCall>, usize) {
    let before = calls.len();
    let kept: Vec<InsertionCall> = calls
        .into_iter()
        .filter(|c| c.support() >= min_evidence)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Strand;
    use crate::evidence::tests::record;

    fn config(max_distance: u64) -> ClusterConfig {
        ClusterConfig::new(max_distance)
    }

    fn run(records: &[EvidenceRecord], max_distance: u64) -> ClusterOutcome {
        let cfg = config(max_distance);
        InsertionClusterer::new(&cfg)
            .cluster_sample("S1", records, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_gap_sweep() {
        let records = vec![
            record("chr1", 1000, "+", "r1"),
            record("chr1", 1100, "+", "r2"),
            record("chr1", 1350, "+", "r3"),
            record("chr1", 2000, "+", "r4"),
        ];
        let outcome = run(&records, 300);
        assert_eq!(outcome.calls.len(), 2);
        assert_eq!(outcome.calls[0].start, 1000);
        assert_eq!(outcome.calls[0].end, 1350);
        assert_eq!(outcome.calls[0].support(), 3);
        assert_eq!(outcome.calls[1].start, 2000);
        assert_eq!(outcome.calls[1].support(), 1);
    }

    #[test]
    fn test_strand_and_chromosome_split_clusters() {
        let records = vec![
            record("chr1", 1000, "+", "r1"),
            record("chr1", 1010, "-", "r2"),
            record("chr2", 1005, "+", "r3"),
        ];
        let outcome = run(&records, 300);
        assert_eq!(outcome.calls.len(), 3);
        assert!(outcome.calls.iter().all(|c| c.support() == 1));
        let reverse: Vec<_> = outcome
            .calls
            .iter()
            .filter(|c| c.strand == Strand::Reverse)
            .collect();
        assert_eq!(reverse.len(), 1);
    }

    #[test]
    fn test_unsorted_input() {
        let records = vec![
            record("chr1", 1200, "+", "r1"),
            record("chr1", 1000, "+", "r2"),
            record("chr1", 1100, "+", "r3"),
        ];
        let outcome = run(&records, 150);
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].start, 1000);
        assert_eq!(outcome.calls[0].end, 1200);
    }

    #[test]
    fn test_members_chain_within_distance() {
        let positions = [10u64, 90, 170, 600, 610, 2000, 2399, 2400];
        let records: Vec<_> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| record("chr1", p, "+", &format!("r{i}")))
            .collect();
        let outcome = run(&records, 400);
        for call in &outcome.calls {
            let pos: Vec<u64> = call.evidence().iter().map(|e| e.position).collect();
            for (i, &p) in pos.iter().enumerate() {
                if pos.len() == 1 {
                    break;
                }
                let near = pos
                    .iter()
                    .enumerate()
                    .any(|(j, &q)| i != j && p.abs_diff(q) <= 400);
                assert!(near, "orphaned member at {p}");
            }
        }
    }

    #[test]
    fn test_missing_strand_rejected_rest_clustered() {
        let mut bad = record("chr1", 1050, "+", "bad");
        bad.strand = None;
        let records = vec![
            record("chr1", 1000, "+", "r1"),
            bad,
            record("chr1", 1100, "+", "r2"),
        ];
        let outcome = run(&records, 300);
        assert_eq!(outcome.validation_errors.len(), 1);
        assert!(matches!(outcome.validation_errors[0], Error::Validation { .. }));
        assert_eq!(outcome.n_evidence, 2);
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].support(), 2);
    }

    #[test]
    fn test_feature_filter() {
        let mut sd = record("chr1", 1000, "+", "r1");
        sd.transposon_feature = Some("SD".to_string());
        let mut other = record("chr1", 1010, "+", "r2");
        other.transposon_feature = Some("ITR".to_string());

        let mut cfg = config(300);
        cfg.transposon_features = vec!["SA".to_string(), "SD".to_string()];
        let outcome = InsertionClusterer::new(&cfg)
            .cluster_sample("S1", &[sd, other], &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.n_feature_filtered, 1);
        assert_eq!(outcome.calls.len(), 1);
        assert!(outcome.calls[0].features.contains("SD"));
    }

    #[test]
    fn test_cancelled_sample_aborts() {
        let cfg = config(300);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = InsertionClusterer::new(&cfg).cluster_sample(
            "S1",
            &[record("chr1", 1000, "+", "r1")],
            &cancel,
        );
        assert!(matches!(result, Err(Error::Aborted { .. })));
    }

    #[test]
    fn test_call_ids_are_sequential() {
        let records = vec![record("chr1", 100, "+", "r1"), record("chr1", 5000, "+", "r2")];
        let outcome = run(&records, 300);
        assert_eq!(outcome.calls[0].id, "S1.INS_1");
        assert_eq!(outcome.calls[1].id, "S1.INS_2");
    }

    #[test]
    fn test_filter_min_support() {
        let records = vec![
            record("chr1", 100, "+", "r1"),
            record("chr1", 110, "+", "r2"),
            record("chr1", 5000, "+", "r3"),
        ];
        let outcome = run(&records, 300);
        let (kept, removed) = filter_min_support(outcome.calls, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
    }
}
