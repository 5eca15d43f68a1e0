// Background insertion rate calibration
//
// The null insertion rate is estimated from the cohort itself: every
// distinct insertion locus counts towards the rate except loci in genes
// that look significant, which are excluded along with their length.
// Exclusion is repeated until the significant set is stable.

use std::collections::{BTreeMap, BTreeSet};

use statrs::distribution::{DiscreteCDF, NegativeBinomial, Poisson};

use crate::annotation::{Gene, GeneIndex, Orientation};
use crate::cohort::CohortTable;
use crate::ctg::correction::benjamini_hochberg;
use crate::error::Error;
use crate::evidence::Strand;
use crate::params::{BackgroundModel, CtgConfig};

/// Upper bound on exclude-and-refit rounds.
pub const MAX_ROUNDS: usize = 10;

/// Pearson dispersion above which `auto` switches to negative binomial.
pub const OVERDISPERSION_THRESHOLD: f64 = 1.5;

/// Independent insertion events observed in one gene across the cohort.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneObservation {
    pub gene_id: String,
    /// Distinct merged insertions linked to the gene.
    pub n_events: u64,
    pub samples: BTreeSet<String>,
    pub sense: usize,
    pub antisense: usize,
}

/// Per-gene event counts from the merged insertions of a cohort.
pub fn observe_genes(table: &CohortTable) -> BTreeMap<String, GeneObservation> {
    let mut observations: BTreeMap<String, GeneObservation> = BTreeMap::new();

    for merged in table.merged.iter().filter(|m| m.gene.is_assigned()) {
        let gene_id = merged.gene.id();
        let obs = observations
            .entry(gene_id.to_string())
            .or_insert_with(|| GeneObservation {
                gene_id: gene_id.to_string(),
                ..Default::default()
            });
        obs.n_events += 1;
        obs.samples.extend(merged.samples.iter().cloned());
        match merged.orientation {
            Some(Orientation::Sense) => obs.sense += 1,
            Some(Orientation::Antisense) => obs.antisense += 1,
            None => {}
        }
    }

    observations
}

/// A distinct genomic insertion locus and the genes it was linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionLocus {
    pub seqname: String,
    pub start: u64,
    pub end: u64,
    pub strand: Option<Strand>,
    /// Empty for unassigned loci.
    pub genes: BTreeSet<String>,
}

/// Distinct loci of a cohort. A call linked to several genes appears as
/// several merged insertions but is one locus.
pub fn insertion_loci(table: &CohortTable) -> Vec<InsertionLocus> {
    let mut loci: BTreeMap<(String, u64, u64, Option<Strand>), BTreeSet<String>> = BTreeMap::new();

    for merged in &table.merged {
        let genes = loci
            .entry((merged.seqname.clone(), merged.start, merged.end, merged.strand))
            .or_default();
        if merged.gene.is_assigned() {
            genes.insert(merged.gene.id().to_string());
        }
    }

    loci.into_iter()
        .map(|((seqname, start, end, strand), genes)| InsertionLocus {
            seqname,
            start,
            end,
            strand,
            genes,
        })
        .collect()
}

/// Gene span widened by the linker's flanking window on both sides.
pub fn effective_length(gene: &Gene, flank_window: u64) -> u64 {
    gene.length().saturating_add(flank_window.saturating_mul(2))
}

/// Count distribution used for the per-gene test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NullModel {
    Poisson,
    /// Variance = mu + alpha * mu^2
    NegativeBinomial { alpha: f64 },
}

impl NullModel {
    /// P(K >= k) for a gene with expected count `mu`.
    pub fn upper_tail(&self, k: u64, mu: f64) -> Result<f64, String> {
        if !(mu > 0.0 && mu.is_finite()) {
            return Err(format!("expected count {mu} is not positive"));
        }
        if k == 0 {
            return Ok(1.0);
        }
        let p = match *self {
            NullModel::Poisson => Poisson::new(mu).map_err(|e| e.to_string())?.sf(k - 1),
            NullModel::NegativeBinomial { alpha } => {
                let r = 1.0 / alpha;
                NegativeBinomial::new(r, r / (r + mu))
                    .map_err(|e| e.to_string())?
                    .sf(k - 1)
            }
        };
        if !p.is_finite() {
            return Err(format!("upper tail at k={k}, expected count {mu} is not finite"));
        }
        Ok(p.clamp(0.0, 1.0))
    }

    /// P(K >= k | K >= 1).
    ///
    /// Only genes with at least one insertion are tested, so the tail is
    /// conditioned on that selection.
    pub fn tested_upper_tail(&self, k: u64, mu: f64) -> Result<f64, String> {
        let any = self.upper_tail(1, mu)?;
        if any <= 0.0 {
            return Err(format!("no probability of any insertion at expected count {mu}"));
        }
        Ok((self.upper_tail(k, mu)? / any).clamp(0.0, 1.0))
    }
}

impl std::fmt::Display for NullModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NullModel::Poisson => write!(f, "Poisson"),
            NullModel::NegativeBinomial { alpha } => write!(f, "negative binomial (alpha={:.4})", alpha),
        }
    }
}

/// Fitted background: per-bp insertion rate and count model.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundCalibration {
    /// Insertions per base pair.
    pub rate: f64,
    pub model: NullModel,
    /// Pearson dispersion statistic over non-excluded genes.
    pub dispersion: f64,
    /// Loci used for the rate.
    pub n_loci: usize,
    /// Genome length minus the effective length of excluded genes.
    pub effective_genome: f64,
    /// Genes left out of the calibration set.
    pub excluded: BTreeSet<String>,
    pub rounds: usize,
    pub flank_window: u64,
}

impl BackgroundCalibration {
    /// Expected number of independent events in `gene` under the null.
    pub fn expected(&self, gene: &Gene) -> f64 {
        self.rate * effective_length(gene, self.flank_window) as f64
    }

    /// Stateless per-gene test: (expected count, p-value).
    pub fn test(&self, gene: &Gene, n_events: u64) -> Result<(f64, f64), Error> {
        let mu = self.expected(gene);
        let p = self
            .model
            .tested_upper_tail(n_events, mu)
            .map_err(|reason| Error::StatisticalDegeneracy {
                gene_id: gene.id.clone(),
                reason,
            })?;
        Ok((mu, p))
    }
}

/// Two-phase background estimation over a gene index.
pub struct Calibrator<'a> {
    index: &'a GeneIndex,
    config: &'a CtgConfig,
}

impl<'a> Calibrator<'a> {
    pub fn new(index: &'a GeneIndex, config: &'a CtgConfig) -> Self {
        Self { index, config }
    }

    /// Estimate the background from observed genes and loci.
    ///
    /// Each round fits the rate with the current excluded set, tests every
    /// observed gene against it and excludes genes with q <= FDR. Stops when
    /// the excluded set no longer changes, or after `MAX_ROUNDS`.
    pub fn calibrate(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        loci: &[InsertionLocus],
        genome_length: u64,
    ) -> Result<BackgroundCalibration, Error> {
        let mut excluded = BTreeSet::new();
        let mut previous: Option<BackgroundCalibration> = None;
        let mut round = 0;

        loop {
            round += 1;
            let fit = match (self.fit(observations, loci, genome_length, &excluded, round), previous) {
                (Ok(fit), _) => fit,
                (Err(e), Some(last)) => {
                    log::warn!("Keeping calibration from round {}: {}", last.rounds, e);
                    return Ok(last);
                }
                (Err(e), None) => return Err(e),
            };
            log::debug!(
                "Calibration round {}: rate {:.3e}/bp from {} loci, dispersion {:.3}, {} excluded genes",
                round,
                fit.rate,
                fit.n_loci,
                fit.dispersion,
                fit.excluded.len()
            );

            let significant = self.significant_genes(observations, &fit);
            if significant == excluded {
                return Ok(fit);
            }
            if round == MAX_ROUNDS {
                log::warn!(
                    "Background calibration did not converge after {} rounds; using last fit",
                    MAX_ROUNDS
                );
                return Ok(fit);
            }
            excluded = significant;
            previous = Some(fit);
        }
    }

    fn fit(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        loci: &[InsertionLocus],
        genome_length: u64,
        excluded: &BTreeSet<String>,
        round: usize,
    ) -> Result<BackgroundCalibration, Error> {
        let flank = self.config.flank_window;

        let excluded_length: u64 = excluded
            .iter()
            .filter_map(|id| self.index.get(id))
            .map(|g| effective_length(g, flank))
            .fold(0u64, |acc, len| acc.saturating_add(len));
        if excluded_length >= genome_length {
            return Err(Error::Calibration(format!(
                "excluded genes cover the whole genome ({} of {} bp)",
                excluded_length, genome_length
            )));
        }
        let effective_genome = (genome_length - excluded_length) as f64;

        let n_loci = loci.iter().filter(|l| l.genes.is_disjoint(excluded)).count();
        if n_loci == 0 {
            return Err(Error::Calibration(
                "no insertions left to estimate the background rate".to_string(),
            ));
        }
        let rate = n_loci as f64 / effective_genome;

        let (dispersion, alpha) = self.dispersion(observations, excluded, rate);
        let model = self.choose_model(dispersion, alpha);

        Ok(BackgroundCalibration {
            rate,
            model,
            dispersion,
            n_loci,
            effective_genome,
            excluded: excluded.clone(),
            rounds: round,
            flank_window: flank,
        })
    }

    /// Pearson dispersion statistic and moment estimate of the negative
    /// binomial alpha, over all annotated genes outside `excluded`.
    fn dispersion(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        excluded: &BTreeSet<String>,
        rate: f64,
    ) -> (f64, f64) {
        let mut pearson = 0.0;
        let mut excess = 0.0;
        let mut mu_sq = 0.0;
        let mut n = 0usize;

        for gene in self.index.genes().iter().filter(|g| !excluded.contains(&g.id)) {
            let mu = rate * effective_length(gene, self.config.flank_window) as f64;
            let k = observations.get(&gene.id).map_or(0, |o| o.n_events) as f64;
            let resid = (k - mu) * (k - mu);
            pearson += resid / mu;
            excess += resid - mu;
            mu_sq += mu * mu;
            n += 1;
        }

        if n < 2 || mu_sq <= 0.0 {
            return (1.0, 0.0);
        }
        (pearson / (n - 1) as f64, excess / mu_sq)
    }

    fn choose_model(&self, dispersion: f64, alpha: f64) -> NullModel {
        match self.config.background_model {
            BackgroundModel::Poisson => NullModel::Poisson,
            BackgroundModel::NegativeBinomial if alpha > 0.0 => NullModel::NegativeBinomial { alpha },
            BackgroundModel::NegativeBinomial => {
                log::warn!(
                    "No overdispersion in calibration set (alpha={:.4}); falling back to Poisson",
                    alpha
                );
                NullModel::Poisson
            }
            BackgroundModel::Auto if dispersion > OVERDISPERSION_THRESHOLD && alpha > 0.0 => {
                NullModel::NegativeBinomial { alpha }
            }
            BackgroundModel::Auto => NullModel::Poisson,
        }
    }

    /// Genes with q <= FDR under a provisional fit.
    fn significant_genes(
        &self,
        observations: &BTreeMap<String, GeneObservation>,
        fit: &BackgroundCalibration,
    ) -> BTreeSet<String> {
        let tested: Vec<(&str, f64)> = observations
            .values()
            .filter(|o| o.n_events > 0)
            .filter_map(|o| {
                let gene = self.index.get(&o.gene_id)?;
                fit.test(gene, o.n_events).ok().map(|(_, p)| (o.gene_id.as_str(), p))
            })
            .collect();

        let p_values: Vec<f64> = tested.iter().map(|&(_, p)| p).collect();
        let q_values = benjamini_hochberg(&p_values);

        tested
            .iter()
            .zip(q_values)
            .filter(|(_, q)| *q <= self.config.fdr_threshold)
            .map(|(&(id, _), _)| id.to_string())
            .collect()
    }
}
