// Expression in insertion-positive vs insertion-negative samples

use rayon::prelude::*;

use crate::ctg::{GeneCall, benjamini_hochberg};
use crate::expression::mann_whitney::{RankSumResult, mann_whitney_u, median};
use crate::expression::matrix::ExpressionMatrix;

/// Expression comparison for one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionResult {
    pub gene_id: String,
    pub gene_name: Option<String>,
    pub n_positive: usize,
    pub n_negative: usize,
    pub median_positive: Option<f64>,
    pub median_negative: Option<f64>,
    /// `None` when either group has no usable sample.
    pub test: Option<RankSumResult>,
    pub q_value: Option<f64>,
}

impl ExpressionResult {
    pub fn p_value(&self) -> Option<f64> {
        self.test.as_ref().map(|t| t.p_value)
    }
}

pub struct ExpressionCorrelator<'a> {
    matrix: &'a ExpressionMatrix,
}

impl<'a> ExpressionCorrelator<'a> {
    pub fn new(matrix: &'a ExpressionMatrix) -> Self {
        Self { matrix }
    }

    /// Compare expression between samples with and without an insertion in
    /// each gene, for genes present in both `calls` and the matrix.
    ///
    /// Negative samples are the cohort samples without an insertion in the
    /// gene. Samples absent from the matrix or with a missing value are left
    /// out of both groups.
    pub fn correlate(&self, calls: &[GeneCall], cohort_samples: &[String]) -> Vec<ExpressionResult> {
        let mut results: Vec<ExpressionResult> = calls
            .par_iter()
            .filter(|call| self.matrix.has_gene(&call.gene_id))
            .map(|call| self.compare(call, cohort_samples))
            .collect();

        let tested: Vec<usize> = (0..results.len()).filter(|&i| results[i].test.is_some()).collect();
        let p_values: Vec<f64> = tested.iter().filter_map(|&i| results[i].p_value()).collect();
        for (&i, q) in tested.iter().zip(benjamini_hochberg(&p_values)) {
            results[i].q_value = Some(q);
        }

        log::info!(
            "Expression comparison for {} of {} genes ({} testable)",
            results.len(),
            calls.len(),
            tested.len()
        );
        results
    }

    fn compare(&self, call: &GeneCall, cohort_samples: &[String]) -> ExpressionResult {
        let mut positive = Vec::new();
        let mut negative = Vec::new();

        for sample in cohort_samples {
            let Some(value) = self.matrix.value(&call.gene_id, sample) else {
                continue;
            };
            if call.samples.binary_search(sample).is_ok() {
                positive.push(value);
            } else {
                negative.push(value);
            }
        }

        ExpressionResult {
            gene_id: call.gene_id.clone(),
            gene_name: call.gene_name.clone(),
            n_positive: positive.len(),
            n_negative: negative.len(),
            median_positive: median(&positive),
            median_negative: median(&negative),
            test: mann_whitney_u(&positive, &negative),
            q_value: None,
        }
    }
}
