// Cohort-level insertion table
//
// Merges annotated insertions across samples into shared merged
// identities (connected components over a tolerance relation).

pub mod merge;
pub mod output;
pub mod union_find;

pub use merge::{CohortEntry, CohortMerger, CohortTable, MergedInsertion, SampleInsertions};
pub use output::write_insertions;
pub use union_find::UnionFind;
