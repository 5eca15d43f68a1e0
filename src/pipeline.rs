// Per-sample processing and cohort assembly
//
// Samples are clustered and annotated independently on a rayon pool; the
// results are collected and only then merged, on one thread.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::annotation::{AnnotatedInsertion, AnnotationLinker, GeneIndex, filter_annotated};
use crate::cohort::{CohortMerger, CohortTable, SampleInsertions};
use crate::error::Error;
use crate::evidence::SampleEvidence;
use crate::genome::GenomeLayout;
use crate::insertion::{CancelToken, InsertionClusterer, filter_min_support};
use crate::params::{ClusterConfig, LinkConfig, MergeConfig};
use crate::stats::RunSummary;

/// Outcome of clustering and annotating one sample.
#[derive(Debug, Default)]
pub struct SampleReport {
    pub sample: String,
    pub insertions: Vec<AnnotatedInsertion>,
    pub n_records: usize,
    pub validation_errors: Vec<Error>,
    pub n_feature_filtered: usize,
    pub n_calls: usize,
    pub n_min_filtered: usize,
    pub n_unassigned: usize,
    pub n_multi_gene: usize,
    pub n_antisense: usize,
    pub n_blacklisted: usize,
}

impl SampleReport {
    fn add_to(&self, summary: &mut RunSummary) {
        summary.samples_completed += 1;
        summary.evidence_total += self.n_records as u64;
        for e in &self.validation_errors {
            summary.record_error(e);
        }
        summary.feature_filtered += self.n_feature_filtered as u64;
        summary.calls_total += self.n_calls as u64;
        summary.min_evidence_filtered += self.n_min_filtered as u64;
        summary.unassigned += self.n_unassigned as u64;
        summary.multi_gene += self.n_multi_gene as u64;
        summary.antisense_filtered += self.n_antisense as u64;
        summary.blacklisted += self.n_blacklisted as u64;
    }
}

/// Clusters and annotates one sample at a time. Holds only shared,
/// read-only state.
pub struct SampleProcessor<'a> {
    cluster: &'a ClusterConfig,
    link: &'a LinkConfig,
    index: &'a GeneIndex,
}

impl<'a> SampleProcessor<'a> {
    pub fn new(cluster: &'a ClusterConfig, link: &'a LinkConfig, index: &'a GeneIndex) -> Self {
        Self {
            cluster,
            link,
            index,
        }
    }

    /// Cluster, filter, link and filter again. Fails only when cancelled.
    pub fn process(&self, evidence: &SampleEvidence, cancel: &CancelToken) -> Result<SampleReport, Error> {
        let outcome =
            InsertionClusterer::new(self.cluster).cluster_sample(&evidence.sample, &evidence.records, cancel)?;
        let n_calls = outcome.calls.len();
        let (calls, n_min_filtered) = filter_min_support(outcome.calls, self.cluster.min_evidence);

        if cancel.is_cancelled() {
            return Err(Error::Aborted {
                sample: evidence.sample.clone(),
            });
        }

        let linked = AnnotationLinker::new(self.index, self.link).link_calls(calls);
        let filtered = filter_annotated(linked.annotated, self.link);

        log::info!(
            "Sample {}: {} records, {} calls, {} annotated insertions kept",
            evidence.sample,
            evidence.records.len(),
            n_calls,
            filtered.kept.len()
        );

        Ok(SampleReport {
            sample: evidence.sample.clone(),
            insertions: filtered.kept,
            n_records: evidence.records.len(),
            validation_errors: outcome.validation_errors,
            n_feature_filtered: outcome.n_feature_filtered,
            n_calls,
            n_min_filtered,
            n_unassigned: linked.n_unassigned,
            n_multi_gene: linked.n_multi_gene,
            n_antisense: filtered.n_antisense,
            n_blacklisted: filtered.n_blacklisted,
        })
    }

    /// Process every sample in parallel, one cancel token per sample.
    ///
    /// Aborted samples are left out and recorded in `summary`; the others
    /// are returned in input order.
    pub fn process_all(
        &self,
        samples: &[SampleEvidence],
        tokens: &[CancelToken],
        summary: &mut RunSummary,
    ) -> Vec<SampleInsertions> {
        let results: Vec<Result<SampleReport, Error>> = samples
            .par_iter()
            .zip(tokens.par_iter())
            .map(|(sample, cancel)| self.process(sample, cancel))
            .collect();

        let mut kept = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(report) => {
                    report.add_to(summary);
                    kept.push(SampleInsertions {
                        sample: report.sample,
                        insertions: report.insertions,
                    });
                }
                Err(e) => {
                    log::warn!("{}", e);
                    summary.record_error(&e);
                }
            }
        }
        kept
    }
}

/// Cluster, annotate and merge a cohort.
pub fn build_cohort(
    samples: &[SampleEvidence],
    tokens: &[CancelToken],
    processor: &SampleProcessor,
    merge: MergeConfig,
    summary: &mut RunSummary,
) -> CohortTable {
    let inputs = processor.process_all(samples, tokens, summary);
    let table = CohortMerger::new(merge).merge(inputs, Some(summary.samples_expected));

    summary.merged_insertions = table.merged.len() as u64;
    summary.suppressed_duplicates = table.suppressed.len() as u64;
    table
}

/// Genome extent for calibration and permutation.
///
/// Without a chromosome sizes table, each chromosome extends to the
/// largest coordinate among annotated genes and cohort insertions.
pub fn genome_layout(index: &GeneIndex, table: &CohortTable) -> GenomeLayout {
    let mut extents: BTreeMap<String, u64> = index.extents();
    for merged in &table.merged {
        let e = extents.entry(merged.seqname.clone()).or_insert(0);
        *e = (*e).max(merged.end);
    }
    GenomeLayout::from_extents(&extents)
}
