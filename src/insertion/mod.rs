// Insertion site calling
//
// Turns one sample's junction evidence into insertion calls:
// - Validation of raw evidence rows (bad rows are skipped and counted)
// - Gap-threshold sweep over (chromosome, strand, position)
// - Confidence scoring from support and junction quality

mod call;
mod cluster;
mod score;

pub use call::{InsertionCall, interval_gap};
pub use cluster::{CancelToken, ClusterOutcome, InsertionClusterer, filter_min_support};
pub use score::{confidence_from_counts, confidence_score};

