/// Gene annotation and insertion linkage
///
/// - GTF parsing into genes with exon boundaries
/// - Interval index queried by overlap with a flanking window
/// - Linking calls to genes (one row per overlapping gene, or unassigned)
/// - Orientation and blacklist filters
pub mod filter;
pub mod gtf;
pub mod index;
pub mod link;

pub use filter::{FilterOutcome, filter_annotated};
pub use index::{Gene, GeneIndex};
pub use link::{AnnotatedInsertion, AnnotationLinker, GeneLink, LinkOutcome, Orientation};
