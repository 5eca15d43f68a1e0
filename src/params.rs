use std::path::PathBuf;

use clap::Parser;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Run mode enum
// ---------------------------------------------------------------------------

/// `--runMode` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Cluster, annotate and merge insertions; write the insertion table.
    Identify,
    /// Everything `Identify` does, then test genes for recurrent targeting.
    Ctg,
}

impl std::str::FromStr for RunMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identify" => Ok(Self::Identify),
            "ctg" => Ok(Self::Ctg),
            _ => Err(format!("unknown runMode '{s}'; expected 'identify' or 'ctg'")),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identify => write!(f, "identify"),
            Self::Ctg => write!(f, "ctg"),
        }
    }
}

// ---------------------------------------------------------------------------
// Background model
// ---------------------------------------------------------------------------

/// Null model for the number of insertions landing in a gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundModel {
    Poisson,
    NegativeBinomial,
    /// Poisson unless the calibration set is overdispersed.
    #[default]
    Auto,
}

impl std::str::FromStr for BackgroundModel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poisson" => Ok(Self::Poisson),
            "negativeBinomial" => Ok(Self::NegativeBinomial),
            "auto" => Ok(Self::Auto),
            _ => Err(format!(
                "unknown backgroundModel '{s}'; expected 'poisson', 'negativeBinomial' or 'auto'"
            )),
        }
    }
}

impl std::fmt::Display for BackgroundModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poisson => write!(f, "poisson"),
            Self::NegativeBinomial => write!(f, "negativeBinomial"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters struct
// ---------------------------------------------------------------------------

/// ruCTG command-line parameters.
///
/// Cluster distance, merge tolerance and flanking window depend on the
/// sequencing data and have no defaults.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ruCTG",
    about = "Transposon insertion calling and commonly targeted gene analysis",
    version
)]
pub struct Parameters {
    // ── Run ─────────────────────────────────────────────────────────────
    /// Run mode: identify or ctg
    #[arg(long = "runMode", default_value = "ctg")]
    pub run_mode: RunMode,

    /// Number of threads
    #[arg(long = "runThreadN", default_value_t = 1)]
    pub run_thread_n: usize,

    // ── Inputs ──────────────────────────────────────────────────────────
    /// Evidence table(s) produced by the aligner (TSV, optionally gzipped)
    #[arg(long = "evidenceFiles", num_args = 1..)]
    pub evidence_files: Vec<PathBuf>,

    /// Gene annotation (GTF, optionally gzipped)
    #[arg(long = "gtfFile")]
    pub gtf_file: Option<PathBuf>,

    /// Chromosome sizes (name<TAB>length); defaults to annotated extents
    #[arg(long = "chromSizes")]
    pub chrom_sizes: Option<PathBuf>,

    /// Per-sample gene expression matrix (TSV)
    #[arg(long = "expressionFile")]
    pub expression_file: Option<PathBuf>,

    // ── Output ──────────────────────────────────────────────────────────
    /// Output file name prefix (including path)
    #[arg(long = "outFileNamePrefix", default_value = "./")]
    pub out_file_name_prefix: PathBuf,

    // ── Clustering ──────────────────────────────────────────────────────
    /// Max gap between consecutive evidence positions within one insertion
    #[arg(long = "clusterDistance")]
    pub cluster_distance: u64,

    /// Min supporting evidence records for an insertion to be kept
    #[arg(long = "minEvidence", default_value_t = 1)]
    pub min_evidence: usize,

    /// Transposon features to keep (e.g. SA SD); empty = keep all
    #[arg(long = "transposonFeatures", num_args = 1..)]
    pub transposon_features: Vec<String>,

    // ── Annotation ──────────────────────────────────────────────────────
    /// Flanking window added around insertions when searching genes
    #[arg(long = "flankWindow")]
    pub flank_window: u64,

    /// Drop insertions antisense to their linked gene
    #[arg(long = "filterOrientation")]
    pub filter_orientation: bool,

    /// Gene ids whose insertions are discarded
    #[arg(long = "blacklistGenes", num_args = 1..)]
    pub blacklist_genes: Vec<String>,

    // ── Cohort ──────────────────────────────────────────────────────────
    /// Max distance between insertions of different samples to merge them
    #[arg(long = "mergeTolerance")]
    pub merge_tolerance: u64,

    /// Number of samples the cohort was meant to contain
    #[arg(long = "expectedSamples")]
    pub expected_samples: Option<usize>,

    // ── CTG statistics ──────────────────────────────────────────────────
    /// Background model: poisson, negativeBinomial or auto
    #[arg(long = "backgroundModel", default_value = "auto")]
    pub background_model: BackgroundModel,

    /// FDR threshold for calling commonly targeted genes
    #[arg(long = "fdrThreshold", default_value_t = 0.05)]
    pub fdr_threshold: f64,

    /// Min samples required to calibrate the background rate
    #[arg(long = "minSamples", default_value_t = 2)]
    pub min_samples: usize,

    /// Permutation trials for the optional randomized p-value; 0 = off
    #[arg(long = "permutationTrials", default_value_t = 0)]
    pub permutation_trials: usize,

    /// Seed for permutation trials
    #[arg(long = "seed", default_value_t = 1)]
    pub seed: u64,
}

impl Parameters {
    /// Validate parameter combinations that clap alone cannot enforce.
    pub fn validate(&self) -> Result<(), Error> {
        if self.evidence_files.is_empty() {
            return Err(Error::Parameter("--evidenceFiles is required".into()));
        }

        if self.gtf_file.is_none() {
            return Err(Error::Parameter("--gtfFile is required".into()));
        }

        if self.run_thread_n == 0 {
            return Err(Error::Parameter("--runThreadN must be >= 1".into()));
        }

        if self.min_evidence == 0 {
            return Err(Error::Parameter("--minEvidence must be >= 1".into()));
        }

        if !(self.fdr_threshold > 0.0 && self.fdr_threshold <= 1.0) {
            return Err(Error::Parameter(format!(
                "--fdrThreshold must be in (0, 1], got {}",
                self.fdr_threshold
            )));
        }

        if self.min_samples == 0 {
            return Err(Error::Parameter("--minSamples must be >= 1".into()));
        }

        if self.expression_file.is_some() && self.run_mode != RunMode::Ctg {
            return Err(Error::Parameter(
                "--expressionFile requires --runMode ctg".into(),
            ));
        }

        Ok(())
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            max_distance: self.cluster_distance,
            min_evidence: self.min_evidence,
            transposon_features: self.transposon_features.clone(),
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            flank_window: self.flank_window,
            filter_orientation: self.filter_orientation,
            blacklist_genes: self.blacklist_genes.clone(),
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            tolerance: self.merge_tolerance,
        }
    }

    pub fn ctg_config(&self) -> CtgConfig {
        CtgConfig {
            background_model: self.background_model,
            fdr_threshold: self.fdr_threshold,
            min_samples: self.min_samples,
            flank_window: self.flank_window,
            permutation_trials: self.permutation_trials,
            seed: self.seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-stage configuration
// ---------------------------------------------------------------------------

/// Insertion clustering settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Max gap between consecutive evidence positions in one cluster.
    pub max_distance: u64,
    /// Calls with fewer supporting records are filtered downstream.
    pub min_evidence: usize,
    /// Allow-list of transposon features; empty keeps everything.
    pub transposon_features: Vec<String>,
}

impl ClusterConfig {
    pub fn new(max_distance: u64) -> Self {
        Self {
            max_distance,
            min_evidence: 1,
            transposon_features: Vec::new(),
        }
    }
}

/// Gene linkage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub flank_window: u64,
    pub filter_orientation: bool,
    pub blacklist_genes: Vec<String>,
}

impl LinkConfig {
    pub fn new(flank_window: u64) -> Self {
        Self {
            flank_window,
            filter_orientation: false,
            blacklist_genes: Vec::new(),
        }
    }
}

/// Cross-sample merge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    pub tolerance: u64,
}

/// CTG statistical engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CtgConfig {
    pub background_model: BackgroundModel,
    pub fdr_threshold: f64,
    pub min_samples: usize,
    /// Same window the linker used; widens each gene's effective length.
    pub flank_window: u64,
    pub permutation_trials: usize,
    pub seed: u64,
}

impl CtgConfig {
    pub fn new(flank_window: u64) -> Self {
        Self {
            background_model: BackgroundModel::Auto,
            fdr_threshold: 0.05,
            min_samples: 2,
            flank_window,
            permutation_trials: 0,
            seed: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
