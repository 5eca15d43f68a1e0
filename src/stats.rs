/// Run summary: tallies of everything skipped, filtered or failed
use log::info;

use crate::error::Error;

/// Per-run counters, reported at the end of a run instead of dropping
/// records silently.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Samples the caller intended to process
    pub samples_expected: usize,
    /// Samples that finished clustering and annotation
    pub samples_completed: usize,
    /// Samples whose processing was cancelled
    pub samples_aborted: Vec<String>,
    /// Evidence records read
    pub evidence_total: u64,
    /// Records rejected with a validation error
    pub validation_failures: u64,
    /// Records dropped by the transposon feature allow-list
    pub feature_filtered: u64,
    /// Insertion calls before filtering
    pub calls_total: u64,
    /// Calls below the minimum evidence threshold
    pub min_evidence_filtered: u64,
    /// Calls with no gene within the flanking window
    pub unassigned: u64,
    /// Calls linked to more than one gene
    pub multi_gene: u64,
    /// Annotated insertions antisense to their gene (orientation filter)
    pub antisense_filtered: u64,
    /// Annotated insertions in blacklisted genes
    pub blacklisted: u64,
    /// Merged insertions in the cohort table
    pub merged_insertions: u64,
    /// Entries suppressed as same-sample duplicates in a merged insertion
    pub suppressed_duplicates: u64,
    /// Genes tested for enrichment
    pub genes_tested: u64,
    /// Genes whose test was degenerate (no p-value)
    pub degenerate_genes: u64,
    /// Genes with q <= FDR threshold
    pub significant_genes: u64,
}

impl RunSummary {
    pub fn new(samples_expected: usize) -> Self {
        Self {
            samples_expected,
            ..Default::default()
        }
    }

    /// Tally a per-record or per-gene error.
    pub fn record_error(&mut self, error: &Error) {
        match error {
            Error::Validation { .. } => self.validation_failures += 1,
            Error::StatisticalDegeneracy { .. } => self.degenerate_genes += 1,
            Error::Aborted { sample } => self.samples_aborted.push(sample.clone()),
            _ => {}
        }
    }

    /// Fewer samples completed than expected
    pub fn is_partial(&self) -> bool {
        self.samples_completed < self.samples_expected
    }

    /// Percentage of `n` relative to `total`
    fn percent(n: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            100.0 * n as f64 / total as f64
        }
    }

    /// Print summary statistics to log
    pub fn print_summary(&self) {
        info!("=== Run Summary ===");
        info!(
            "Samples: {} of {} completed{}",
            self.samples_completed,
            self.samples_expected,
            if self.is_partial() { " (partial cohort)" } else { "" }
        );
        if !self.samples_aborted.is_empty() {
            info!("Aborted samples: {}", self.samples_aborted.join(", "));
        }

        if self.evidence_total == 0 {
            info!("No evidence processed");
            return;
        }

        info!("Evidence records: {}", self.evidence_total);
        info!(
            "Validation failures: {} ({:.2}%)",
            self.validation_failures,
            Self::percent(self.validation_failures, self.evidence_total)
        );
        if self.feature_filtered > 0 {
            info!(
                "Filtered by transposon feature: {} ({:.2}%)",
                self.feature_filtered,
                Self::percent(self.feature_filtered, self.evidence_total)
            );
        }

        info!("Insertion calls: {}", self.calls_total);
        info!(
            "Below minimum evidence: {} ({:.2}%)",
            self.min_evidence_filtered,
            Self::percent(self.min_evidence_filtered, self.calls_total)
        );
        info!(
            "Unassigned (no gene in window): {} ({:.2}%)",
            self.unassigned,
            Self::percent(self.unassigned, self.calls_total)
        );
        if self.multi_gene > 0 {
            info!("Linked to multiple genes: {}", self.multi_gene);
        }
        if self.antisense_filtered > 0 {
            info!("Antisense insertions filtered: {}", self.antisense_filtered);
        }
        if self.blacklisted > 0 {
            info!("Blacklisted gene insertions filtered: {}", self.blacklisted);
        }

        info!("Merged insertions: {}", self.merged_insertions);
        info!("Suppressed duplicate entries: {}", self.suppressed_duplicates);

        if self.genes_tested > 0 {
            info!("Genes tested: {}", self.genes_tested);
            info!("Degenerate gene tests: {}", self.degenerate_genes);
            info!(
                "Significant genes: {} ({:.2}%)",
                self.significant_genes,
                Self::percent(self.significant_genes, self.genes_tested)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_default() {
        let summary = RunSummary::default();
        assert_eq!(summary.evidence_total, 0);
        assert_eq!(summary.validation_failures, 0);
        assert!(!summary.is_partial());
    }

    #[test]
    fn test_record_errors() {
        let mut summary = RunSummary::new(3);
        summary.record_error(&Error::Validation {
            record: "r1".into(),
            reason: "missing strand".into(),
        });
        summary.record_error(&Error::StatisticalDegeneracy {
            gene_id: "G1".into(),
            reason: "zero rate".into(),
        });
        summary.record_error(&Error::Aborted {
            sample: "S2".into(),
        });
        summary.record_error(&Error::EmptyCohort);

        assert_eq!(summary.validation_failures, 1);
        assert_eq!(summary.degenerate_genes, 1);
        assert_eq!(summary.samples_aborted, vec!["S2".to_string()]);
    }

    #[test]
    fn test_partial() {
        let mut summary = RunSummary::new(3);
        summary.samples_completed = 2;
        assert!(summary.is_partial());
        summary.samples_completed = 3;
        assert!(!summary.is_partial());
    }

    #[test]
    fn test_percent() {
        assert_eq!(RunSummary::percent(1, 4), 25.0);
        assert_eq!(RunSummary::percent(1, 0), 0.0);
    }
}
