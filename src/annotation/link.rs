// Gene linkage for insertion calls

use std::sync::Arc;

use crate::annotation::index::{Gene, GeneIndex};
use crate::evidence::Strand;
use crate::insertion::InsertionCall;
use crate::params::LinkConfig;

/// Gene an insertion is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeneLink {
    Gene {
        id: String,
        name: Option<String>,
        strand: Option<Strand>,
    },
    /// No gene within the flanking window.
    Unassigned,
}

impl GeneLink {
    pub const UNASSIGNED: &'static str = "unassigned";

    pub fn id(&self) -> &str {
        match self {
            GeneLink::Gene { id, .. } => id,
            GeneLink::Unassigned => Self::UNASSIGNED,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            GeneLink::Gene { name, .. } => name.as_deref(),
            GeneLink::Unassigned => None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, GeneLink::Gene { .. })
    }
}

/// Insertion strand relative to the gene it is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Sense,
    Antisense,
}

impl Orientation {
    /// `None` when the gene has no strand.
    pub fn between(insertion: Strand, gene: Option<Strand>) -> Option<Self> {
        gene.map(|g| {
            if g == insertion {
                Orientation::Sense
            } else {
                Orientation::Antisense
            }
        })
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Sense => write!(f, "sense"),
            Orientation::Antisense => write!(f, "antisense"),
        }
    }
}

/// An insertion call linked to one gene (or to none).
///
/// A call overlapping several genes yields one `AnnotatedInsertion` per
/// gene, all sharing the same call.
#[derive(Debug, Clone)]
pub struct AnnotatedInsertion {
    pub call: Arc<InsertionCall>,
    pub gene: GeneLink,
    pub orientation: Option<Orientation>,
    /// Distance to the nearest exon (or gene) boundary.
    pub boundary_distance: Option<u64>,
}

impl AnnotatedInsertion {
    fn linked(call: &Arc<InsertionCall>, gene: &Gene) -> Self {
        Self {
            call: Arc::clone(call),
            gene: GeneLink::Gene {
                id: gene.id.clone(),
                name: gene.name.clone(),
                strand: gene.strand,
            },
            orientation: Orientation::between(call.strand, gene.strand),
            boundary_distance: Some(gene.boundary_distance(call.start, call.end)),
        }
    }

    fn unassigned(call: Arc<InsertionCall>) -> Self {
        Self {
            call,
            gene: GeneLink::Unassigned,
            orientation: None,
            boundary_distance: None,
        }
    }

    pub fn sample(&self) -> &str {
        &self.call.sample
    }
}

/// Result of linking one sample's calls.
#[derive(Debug, Default)]
pub struct LinkOutcome {
    pub annotated: Vec<AnnotatedInsertion>,
    /// Calls with no gene in the window.
    pub n_unassigned: usize,
    /// Calls linked to more than one gene.
    pub n_multi_gene: usize,
}

/// Links insertion calls to genes of a shared, read-only index.
pub struct AnnotationLinker<'a> {
    index: &'a GeneIndex,
    config: &'a LinkConfig,
}

impl<'a> AnnotationLinker<'a> {
    pub fn new(index: &'a GeneIndex, config: &'a LinkConfig) -> Self {
        Self { index, config }
    }

    /// Link every call to the genes overlapping its interval widened by the
    /// flanking window. Calls with no such gene are kept as unassigned.
    pub fn link_calls(&self, calls: Vec<InsertionCall>) -> LinkOutcome {
        let mut outcome = LinkOutcome::default();

        for call in calls {
            let call = Arc::new(call);
            let genes = self.genes_near(&call);

            match genes.len() {
                0 => {
                    log::debug!(
                        "{}: no gene within {} bp of {}:{}-{}",
                        call.id,
                        self.config.flank_window,
                        call.seqname,
                        call.start,
                        call.end
                    );
                    outcome.n_unassigned += 1;
                    outcome.annotated.push(AnnotatedInsertion::unassigned(call));
                }
                n => {
                    if n > 1 {
                        outcome.n_multi_gene += 1;
                    }
                    outcome
                        .annotated
                        .extend(genes.iter().map(|g| AnnotatedInsertion::linked(&call, g)));
                }
            }
        }

        outcome
    }

    fn genes_near(&self, call: &InsertionCall) -> Vec<&'a Gene> {
        let w = self.config.flank_window;
        let start = call.start.saturating_sub(w).max(1);
        let end = call.end.saturating_add(w);
        self.index.overlapping(&call.seqname, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::index::tests::gene;
    use crate::evidence::tests::record;

    fn call(seqname: &str, position: u64, strand: &str) -> InsertionCall {
        let evidence = record(seqname, position, strand, "r1").validate().unwrap();
        InsertionCall::from_cluster(format!("S1.{position}"), "S1", vec![evidence]).unwrap()
    }

    fn index() -> GeneIndex {
        GeneIndex::new(vec![
            gene("G1", "chr2", 900, 1_200, Strand::Forward),
            gene("G2", "chr2", 1_100, 3_000, Strand::Reverse),
            gene("G3", "chr2", 8_000, 9_000, Strand::Forward),
        ])
    }

    #[test]
    fn test_overlap_links_gene_with_orientation() {
        let idx = index();
        let cfg = LinkConfig::new(0);
        let outcome = AnnotationLinker::new(&idx, &cfg).link_calls(vec![call("chr2", 1_000, "+")]);

        assert_eq!(outcome.annotated.len(), 1);
        let a = &outcome.annotated[0];
        assert_eq!(a.gene.id(), "G1");
        assert_eq!(a.gene.name(), Some("G1_name"));
        assert_eq!(a.orientation, Some(Orientation::Sense));
        assert_eq!(a.boundary_distance, Some(100));
    }

    #[test]
    fn test_multiple_genes_one_row_each() {
        let idx = index();
        let cfg = LinkConfig::new(0);
        let outcome = AnnotationLinker::new(&idx, &cfg).link_calls(vec![call("chr2", 1_150, "+")]);

        let ids: Vec<&str> = outcome.annotated.iter().map(|a| a.gene.id()).collect();
        assert_eq!(ids, vec!["G1", "G2"]);
        assert_eq!(outcome.annotated[1].orientation, Some(Orientation::Antisense));
        assert_eq!(outcome.n_multi_gene, 1);
        assert!(Arc::ptr_eq(&outcome.annotated[0].call, &outcome.annotated[1].call));
    }

    #[test]
    fn test_flank_window_reaches_nearby_gene() {
        let idx = index();
        let narrow = LinkConfig::new(100);
        let wide = LinkConfig::new(3_000);

        let outcome = AnnotationLinker::new(&idx, &narrow).link_calls(vec![call("chr2", 5_000, "+")]);
        assert_eq!(outcome.n_unassigned, 1);
        assert_eq!(outcome.annotated[0].gene, GeneLink::Unassigned);
        assert_eq!(outcome.annotated[0].gene.id(), "unassigned");
        assert_eq!(outcome.annotated[0].orientation, None);

        let outcome = AnnotationLinker::new(&idx, &wide).link_calls(vec![call("chr2", 5_000, "+")]);
        let ids: Vec<&str> = outcome.annotated.iter().map(|a| a.gene.id()).collect();
        assert_eq!(ids, vec!["G2", "G3"]);
        assert_eq!(outcome.n_unassigned, 0);
    }

    #[test]
    fn test_window_clamped_at_chromosome_start() {
        let idx = GeneIndex::new(vec![gene("G0", "chr1", 1, 50, Strand::Forward)]);
        let cfg = LinkConfig::new(500);
        let outcome = AnnotationLinker::new(&idx, &cfg).link_calls(vec![call("chr1", 100, "-")]);
        assert_eq!(outcome.annotated[0].gene.id(), "G0");
        assert_eq!(outcome.annotated[0].orientation, Some(Orientation::Antisense));
    }

    #[test]
    fn test_unstranded_gene_has_no_orientation() {
        let mut g = gene("G9", "chr1", 100, 200, Strand::Forward);
        g.strand = None;
        let idx = GeneIndex::new(vec![g]);
        let cfg = LinkConfig::new(0);
        let outcome = AnnotationLinker::new(&idx, &cfg).link_calls(vec![call("chr1", 150, "+")]);
        assert_eq!(outcome.annotated[0].orientation, None);
    }
}
