// Post-linkage filters

use std::collections::HashSet;

use crate::annotation::link::{AnnotatedInsertion, Orientation};
use crate::params::LinkConfig;

/// Annotated insertions surviving the filters, with per-filter tallies.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<AnnotatedInsertion>,
    pub n_antisense: usize,
    pub n_blacklisted: usize,
}

/// Drop insertions linked to blacklisted genes and, when orientation
/// filtering is on, insertions antisense to their gene.
///
/// Unassigned insertions and insertions into unstranded genes are never
/// removed by the orientation filter.
pub fn filter_annotated(annotated: Vec<AnnotatedInsertion>, config: &LinkConfig) -> FilterOutcome {
    let blacklist: HashSet<&str> = config.blacklist_genes.iter().map(String::as_str).collect();
    let mut outcome = FilterOutcome::default();

    for insertion in annotated {
        if blacklist.contains(insertion.gene.id()) {
            outcome.n_blacklisted += 1;
            continue;
        }
        if config.filter_orientation && insertion.orientation == Some(Orientation::Antisense) {
            outcome.n_antisense += 1;
            continue;
        }
        outcome.kept.push(insertion);
    }

    outcome
}
