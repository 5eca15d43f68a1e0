// Permutation p-values by genome-wide position shuffling
//
// Each trial drops the cohort's insertion loci uniformly over the genome,
// links them to genes the same way the linker does, and checks whether a
// gene reaches its observed event count. Trials are seeded individually
// (seed + trial index), so results do not depend on thread scheduling.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::annotation::GeneIndex;
use crate::ctg::calibrate::GeneObservation;
use crate::genome::GenomeLayout;

pub struct PermutationTest<'a> {
    index: &'a GeneIndex,
    genome: &'a GenomeLayout,
    flank_window: u64,
    trials: usize,
    seed: u64,
}

impl<'a> PermutationTest<'a> {
    pub fn new(index: &'a GeneIndex, genome: &'a GenomeLayout, flank_window: u64, trials: usize, seed: u64) -> Self {
        Self {
            index,
            genome,
            flank_window,
            trials,
            seed,
        }
    }

    /// Empirical p-value per observed gene:
    /// (1 + #trials with count >= observed) / (1 + trials).
    pub fn p_values(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        n_loci: usize,
    ) -> BTreeMap<String, f64> {
        let tested: Vec<&GeneObservation> = observations.values().filter(|o| o.n_events > 0).collect();
        if tested.is_empty() || self.trials == 0 {
            return BTreeMap::new();
        }

        let slots: HashMap<&str, usize> = tested
            .iter()
            .enumerate()
            .map(|(slot, o)| (o.gene_id.as_str(), slot))
            .collect();
        let observed: Vec<u64> = tested.iter().map(|o| o.n_events).collect();

        log::info!(
            "Running {} permutation trials ({} loci, {} genes, seed {})",
            self.trials,
            n_loci,
            tested.len(),
            self.seed
        );

        let exceed: Vec<u64> = (0..self.trials)
            .into_par_iter()
            .map(|trial| {
                let counts = self.shuffle(trial, n_loci, &slots);
                counts
                    .iter()
                    .zip(&observed)
                    .map(|(c, k)| u64::from(c >= k))
                    .collect::<Vec<u64>>()
            })
            .reduce(
                || vec![0; observed.len()],
                |mut acc, hits| {
                    acc.iter_mut().zip(hits).for_each(|(a, h)| *a += h);
                    acc
                },
            );

        let denom = (self.trials + 1) as f64;
        tested
            .iter()
            .zip(exceed)
            .map(|(o, n)| (o.gene_id.clone(), (n + 1) as f64 / denom))
            .collect()
    }

    /// Per-gene event counts for one randomised placement of `n_loci`.
    fn shuffle(&self, trial: usize, n_loci: usize, slots: &HashMap<&str, usize>) -> Vec<u64> {
        let mut counts = vec![0u64; slots.len()];
        let total = self.genome.total_length();
        if total == 0 {
            return counts;
        }

        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(trial as u64));
        for _ in 0..n_loci {
            let Some((chr, pos)) = self.genome.position_to_chr(rng.gen_range(0..total)) else {
                continue;
            };
            let start = pos.saturating_sub(self.flank_window).max(1);
            let end = pos.saturating_add(self.flank_window);
            for gene in self.index.overlapping(&self.genome.chr_name[chr], start, end) {
                if let Some(&slot) = slots.get(gene.id.as_str()) {
                    counts[slot] += 1;
                }
            }
        }
        counts
    }
}
