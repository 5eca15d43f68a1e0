/// Expression correlation
///
/// Compares per-sample expression of each tested gene between samples with
/// an insertion in the gene and the rest of the cohort (Mann-Whitney U),
/// with Benjamini-Hochberg across genes.
pub mod correlate;
pub mod mann_whitney;
pub mod matrix;
pub mod output;

pub use correlate::{ExpressionCorrelator, ExpressionResult};
pub use mann_whitney::{RankSumResult, mann_whitney_u};
pub use matrix::ExpressionMatrix;
pub use output::write_expression;
