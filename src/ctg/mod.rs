// Commonly targeted gene analysis
//
// Two phases with a single barrier between them:
// 1. Calibrate: estimate the background insertion rate from the cohort
// 2. Test: per-gene upper-tail test against that background (parallel),
//    then Benjamini-Hochberg across tested genes
//
// Optional permutation p-values shuffle insertion loci genome-wide.

pub mod calibrate;
pub mod correction;
pub mod engine;
pub mod output;
pub mod permutation;

pub use calibrate::{BackgroundCalibration, Calibrator, GeneObservation, NullModel};
pub use correction::benjamini_hochberg;
pub use engine::{CtgEngine, CtgOutcome, GeneCall};
pub use output::write_ctg;
pub use permutation::PermutationTest;
