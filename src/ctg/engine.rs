// Commonly targeted gene (CTG) testing

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::annotation::GeneIndex;
use crate::cohort::CohortTable;
use crate::ctg::calibrate::{
    BackgroundCalibration, Calibrator, GeneObservation, insertion_loci, observe_genes,
};
use crate::ctg::correction::benjamini_hochberg;
use crate::ctg::permutation::PermutationTest;
use crate::error::Error;
use crate::evidence::Strand;
use crate::genome::GenomeLayout;
use crate::params::CtgConfig;

/// Cohort-level result for one gene with at least one insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneCall {
    pub gene_id: String,
    pub gene_name: Option<String>,
    pub seqname: String,
    pub start: u64,
    pub end: u64,
    pub strand: Option<Strand>,
    /// Samples with an insertion in the gene, sorted.
    pub samples: Vec<String>,
    /// Independent insertion events (distinct merged insertions).
    pub n_insertions: u64,
    pub sense: usize,
    pub antisense: usize,
    /// Expected events under the background model.
    pub expected: Option<f64>,
    /// P(K >= n_insertions | K >= 1) under the background model: the upper
    /// tail conditioned on the gene having been selected for testing.
    /// `None` when the gene's test was degenerate.
    pub p_value: Option<f64>,
    pub q_value: Option<f64>,
    pub perm_p_value: Option<f64>,
}

impl GeneCall {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Fraction of stranded events in sense orientation.
    pub fn orientation_bias(&self) -> Option<f64> {
        let stranded = self.sense + self.antisense;
        (stranded > 0).then(|| self.sense as f64 / stranded as f64)
    }

    pub fn is_significant(&self, fdr_threshold: f64) -> bool {
        self.q_value.is_some_and(|q| q <= fdr_threshold)
    }
}

/// Output of a CTG run.
#[derive(Debug)]
pub struct CtgOutcome {
    /// Ranked by p-value; degenerate genes last.
    pub calls: Vec<GeneCall>,
    pub calibration: BackgroundCalibration,
    /// One `StatisticalDegeneracy` per gene whose test could not run.
    pub degenerate: Vec<Error>,
    pub n_samples: usize,
    pub partial: bool,
}

impl CtgOutcome {
    pub fn n_significant(&self, fdr_threshold: f64) -> usize {
        self.calls.iter().filter(|c| c.is_significant(fdr_threshold)).count()
    }
}

/// Calibrates a background on the cohort, then tests every gene with at
/// least one insertion against it.
pub struct CtgEngine<'a> {
    index: &'a GeneIndex,
    config: &'a CtgConfig,
}

impl<'a> CtgEngine<'a> {
    pub fn new(index: &'a GeneIndex, config: &'a CtgConfig) -> Self {
        Self { index, config }
    }

    pub fn run(&self, table: &CohortTable, genome: &GenomeLayout) -> Result<CtgOutcome, Error> {
        let observations = observe_genes(table);
        self.check_cohort(table, &observations)?;

        if table.is_partial() {
            log::warn!(
                "Testing a partial cohort: {} of {} expected samples",
                table.n_samples(),
                table.expected_samples
            );
        }

        let loci = insertion_loci(table);
        let calibration =
            Calibrator::new(self.index, self.config).calibrate(&observations, &loci, genome.total_length())?;
        log::info!(
            "Background: {:.3e} insertions/bp from {} loci over {:.0} bp, model {}, dispersion {:.3} ({} genes excluded, {} rounds)",
            calibration.rate,
            calibration.n_loci,
            calibration.effective_genome,
            calibration.model,
            calibration.dispersion,
            calibration.excluded.len(),
            calibration.rounds
        );

        let (mut calls, degenerate) = self.test_genes(&observations, &calibration);

        if self.config.permutation_trials > 0 {
            let perm = PermutationTest::new(
                self.index,
                genome,
                self.config.flank_window,
                self.config.permutation_trials,
                self.config.seed,
            )
            .p_values(&observations, loci.len());
            for call in &mut calls {
                call.perm_p_value = perm.get(&call.gene_id).copied();
            }
        }

        Ok(CtgOutcome {
            calls,
            calibration,
            degenerate,
            n_samples: table.n_samples(),
            partial: table.is_partial(),
        })
    }

    /// Test observed genes against a finished calibration.
    ///
    /// Genes are independent, so the tests run in parallel. Degenerate
    /// genes keep their row with no p-value. BH correction covers every gene
    /// with a p-value.
    pub fn test_genes(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        calibration: &BackgroundCalibration,
    ) -> (Vec<GeneCall>, Vec<Error>) {
        let tested: Vec<&GeneObservation> = observations.values().filter(|o| o.n_events > 0).collect();

        let results: Vec<(GeneCall, Option<Error>)> = tested
            .par_iter()
            .map(|obs| self.test_gene(obs, calibration))
            .collect();

        let mut calls = Vec::with_capacity(results.len());
        let mut degenerate = Vec::new();
        for (call, err) in results {
            if let Some(e) = err {
                log::warn!("{}", e);
                degenerate.push(e);
            }
            calls.push(call);
        }

        let with_p: Vec<usize> = (0..calls.len()).filter(|&i| calls[i].p_value.is_some()).collect();
        let p_values: Vec<f64> = with_p.iter().filter_map(|&i| calls[i].p_value).collect();
        for (&i, q) in with_p.iter().zip(benjamini_hochberg(&p_values)) {
            calls[i].q_value = Some(q);
        }

        calls.sort_by(|a, b| {
            match (a.p_value, b.p_value) {
                (Some(pa), Some(pb)) => pa.total_cmp(&pb),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| a.gene_id.cmp(&b.gene_id))
        });

        (calls, degenerate)
    }

    fn test_gene(&self, obs: &GeneObservation, calibration: &BackgroundCalibration) -> (GeneCall, Option<Error>) {
        let gene = self.index.get(&obs.gene_id);
        let mut call = GeneCall {
            gene_id: obs.gene_id.clone(),
            gene_name: gene.and_then(|g| g.name.clone()),
            seqname: gene.map(|g| g.seqname.clone()).unwrap_or_default(),
            start: gene.map_or(0, |g| g.start),
            end: gene.map_or(0, |g| g.end),
            strand: gene.and_then(|g| g.strand),
            samples: obs.samples.iter().cloned().collect(),
            n_insertions: obs.n_events,
            sense: obs.sense,
            antisense: obs.antisense,
            expected: None,
            p_value: None,
            q_value: None,
            perm_p_value: None,
        };

        let Some(gene) = gene else {
            let err = Error::StatisticalDegeneracy {
                gene_id: obs.gene_id.clone(),
                reason: "gene is not in the annotation".to_string(),
            };
            return (call, Some(err));
        };

        match calibration.test(gene, obs.n_events) {
            Ok((expected, p)) => {
                call.expected = Some(expected);
                call.p_value = Some(p);
                (call, None)
            }
            Err(e) => (call, Some(e)),
        }
    }

    fn check_cohort(
        &self,
        table: &CohortTable,
        observations: &BTreeMap<String, GeneObservation>,
    ) -> Result<(), Error> {
        if table.n_samples() == 0 || table.merged.is_empty() {
            return Err(Error::EmptyCohort);
        }
        if table.n_samples() < self.config.min_samples {
            return Err(Error::InsufficientCohort {
                required: self.config.min_samples,
                available: table.n_samples(),
                samples: table.samples.clone(),
                genes: observations.keys().cloned().collect(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::index::tests::gene;
    use crate::annotation::{AnnotationLinker, Gene};
    use crate::cohort::{CohortMerger, SampleInsertions};
    use crate::ctg::calibrate::{InsertionLocus, NullModel};
    use crate::evidence::tests::record;
    use crate::insertion::InsertionCall;
    use crate::params::{BackgroundModel, LinkConfig, MergeConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn sample(index: &GeneIndex, name: &str, positions: &[u64], flank: u64) -> SampleInsertions {
        let calls = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let ev = record("chr2", p, "+", "r").validate().unwrap();
                InsertionCall::from_cluster(format!("{name}.INS_{}", i + 1), name, vec![ev]).unwrap()
            })
            .collect();
        let cfg = LinkConfig::new(flank);
        SampleInsertions {
            sample: name.to_string(),
            insertions: AnnotationLinker::new(index, &cfg).link_calls(calls).annotated,
        }
    }

    fn scenario_table(index: &GeneIndex, flank: u64) -> CohortTable {
        let inputs = vec![
            sample(index, "S1", &[1_000], flank),
            sample(index, "S2", &[1_050], flank),
            sample(index, "S3", &[5_000], flank),
        ];
        CohortMerger::new(MergeConfig { tolerance: 200 }).merge(inputs, None)
    }

    fn scenario_index() -> GeneIndex {
        GeneIndex::new(vec![
            gene("G1", "chr2", 900, 1_200, Strand::Forward),
            gene("G2", "chr2", 40_000, 41_000, Strand::Forward),
        ])
    }

    #[test]
    fn test_scenario_counts_independent_events() {
        let index = scenario_index();
        let genome = GenomeLayout::new(vec![("chr2".to_string(), 100_000)]);

        // Sample 3's call within the flanking window: two events
        let cfg = CtgConfig::new(4_000);
        let outcome = CtgEngine::new(&index, &cfg)
            .run(&scenario_table(&index, 4_000), &genome)
            .unwrap();
        assert_eq!(outcome.calls.len(), 1);
        let g1 = &outcome.calls[0];
        assert_eq!(g1.gene_id, "G1");
        assert_eq!(g1.n_insertions, 2);
        assert_eq!(g1.samples, vec!["S1", "S2", "S3"]);
        assert_eq!(g1.orientation_bias(), Some(1.0));

        // Outside the window: one event
        let cfg = CtgConfig::new(0);
        let outcome = CtgEngine::new(&index, &cfg)
            .run(&scenario_table(&index, 0), &genome)
            .unwrap();
        assert_eq!(outcome.calls[0].n_insertions, 1);
        assert_eq!(outcome.calibration.n_loci, 2);
    }

    #[test]
    fn test_untested_genes_have_no_call() {
        let index = scenario_index();
        let genome = GenomeLayout::new(vec![("chr2".to_string(), 100_000)]);
        let cfg = CtgConfig::new(0);
        let outcome = CtgEngine::new(&index, &cfg)
            .run(&scenario_table(&index, 0), &genome)
            .unwrap();
        assert!(outcome.calls.iter().all(|c| c.gene_id != "G2"));
        for call in &outcome.calls {
            let p = call.p_value.unwrap();
            let q = call.q_value.unwrap();
            assert!((0.0..=1.0).contains(&p));
            assert!(q >= p);
        }
    }

    #[test]
    fn test_insufficient_cohort() {
        let index = scenario_index();
        let genome = GenomeLayout::new(vec![("chr2".to_string(), 100_000)]);
        let mut cfg = CtgConfig::new(0);
        cfg.min_samples = 5;
        let err = CtgEngine::new(&index, &cfg)
            .run(&scenario_table(&index, 0), &genome)
            .unwrap_err();
        match err {
            Error::InsufficientCohort {
                required,
                available,
                samples,
                genes,
            } => {
                assert_eq!(required, 5);
                assert_eq!(available, 3);
                assert_eq!(samples, vec!["S1", "S2", "S3"]);
                assert_eq!(genes, vec!["G1"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_cohort() {
        let index = scenario_index();
        let genome = GenomeLayout::new(vec![("chr2".to_string(), 100_000)]);
        let cfg = CtgConfig::new(0);
        let table = CohortMerger::new(MergeConfig { tolerance: 200 }).merge(Vec::new(), None);
        let err = CtgEngine::new(&index, &cfg).run(&table, &genome).unwrap_err();
        assert!(matches!(err, Error::EmptyCohort));
    }

    #[test]
    fn test_degenerate_gene_has_no_p_value() {
        let index = scenario_index();
        let cfg = CtgConfig::new(0);
        let engine = CtgEngine::new(&index, &cfg);
        let calibration = BackgroundCalibration {
            rate: 0.0,
            model: NullModel::Poisson,
            dispersion: 1.0,
            n_loci: 0,
            effective_genome: 1.0,
            excluded: BTreeSet::new(),
            rounds: 1,
            flank_window: 0,
        };
        let observations: BTreeMap<String, GeneObservation> = [(
            "G1".to_string(),
            GeneObservation {
                gene_id: "G1".to_string(),
                n_events: 3,
                ..Default::default()
            },
        )]
        .into();

        let (calls, degenerate) = engine.test_genes(&observations, &calibration);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].p_value.is_none());
        assert!(calls[0].q_value.is_none());
        assert_eq!(degenerate.len(), 1);
        assert!(matches!(degenerate[0], Error::StatisticalDegeneracy { .. }));
    }

    #[test]
    fn test_output_is_deterministic() {
        let index = scenario_index();
        let genome = GenomeLayout::new(vec![("chr2".to_string(), 100_000)]);
        let mut cfg = CtgConfig::new(4_000);
        cfg.permutation_trials = 50;
        let engine = CtgEngine::new(&index, &cfg);
        let a = engine.run(&scenario_table(&index, 4_000), &genome).unwrap();
        let b = engine.run(&scenario_table(&index, 4_000), &genome).unwrap();
        assert_eq!(a.calls, b.calls);
        assert!(a.calls[0].perm_p_value.is_some());
    }

    /// Null cohort: insertions land uniformly at random. Every discovery is
    /// false, so the mean false discovery proportion must stay below alpha.
    #[test]
    fn test_fdr_control_under_null() {
        let alpha = 0.2;
        let n_genes = 200u64;
        let spacing = 10_000u64;
        let genome_length = n_genes * spacing;

        let genes: Vec<Gene> = (0..n_genes)
            .map(|i| gene(&format!("N{i}"), "chr1", i * spacing + 1, i * spacing + 1_000, Strand::Forward))
            .collect();
        let index = GeneIndex::new(genes);
        let mut cfg = CtgConfig::new(0);
        cfg.background_model = BackgroundModel::Poisson;
        cfg.fdr_threshold = alpha;
        let engine = CtgEngine::new(&index, &cfg);

        let reps = 100;
        let mut fdp_sum = 0.0;
        for rep in 0..reps {
            let mut rng = StdRng::seed_from_u64(1_000 + rep);
            let mut observations: BTreeMap<String, GeneObservation> = BTreeMap::new();
            let mut loci = Vec::new();

            for _ in 0..300 {
                let pos = rng.gen_range(1..=genome_length);
                let mut genes = BTreeSet::new();
                if let Some(g) = index.overlapping("chr1", pos, pos).first() {
                    let obs = observations.entry(g.id.clone()).or_insert_with(|| GeneObservation {
                        gene_id: g.id.clone(),
                        ..Default::default()
                    });
                    obs.n_events += 1;
                    genes.insert(g.id.clone());
                }
                loci.push(InsertionLocus {
                    seqname: "chr1".to_string(),
                    start: pos,
                    end: pos,
                    strand: Some(Strand::Forward),
                    genes,
                });
            }

            let calibration = Calibrator::new(&index, &cfg)
                .calibrate(&observations, &loci, genome_length)
                .unwrap();
            let (calls, _) = engine.test_genes(&observations, &calibration);

            let discoveries = calls.iter().filter(|c| c.is_significant(alpha)).count();
            if discoveries > 0 {
                fdp_sum += 1.0;
            }
            for call in &calls {
                let p = call.p_value.unwrap();
                assert!((0.0..=1.0).contains(&p));
                assert!(call.q_value.unwrap() >= p);
            }
        }

        let fdr = fdp_sum / reps as f64;
        assert!(fdr <= alpha, "empirical FDR {fdr} exceeds {alpha}");
    }
}
