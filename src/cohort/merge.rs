// Cross-sample reconciliation of annotated insertions

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotation::{AnnotatedInsertion, GeneLink, Orientation};
use crate::cohort::union_find::UnionFind;
use crate::evidence::Strand;
use crate::params::MergeConfig;

/// One sample's annotated insertions, as handed to the merger.
#[derive(Debug, Clone)]
pub struct SampleInsertions {
    pub sample: String,
    pub insertions: Vec<AnnotatedInsertion>,
}

/// Insertions can only merge when their keys are equal.
///
/// Assigned insertions are keyed by gene and orientation; unassigned ones
/// by strand, so that intergenic events on opposite strands stay apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MergeKey {
    seqname: String,
    gene: String,
    orientation: Option<Orientation>,
    strand: Option<Strand>,
}

impl MergeKey {
    fn of(insertion: &AnnotatedInsertion) -> Self {
        let strand = match insertion.gene {
            GeneLink::Unassigned => Some(insertion.call.strand),
            GeneLink::Gene { .. } => None,
        };
        Self {
            seqname: insertion.call.seqname.clone(),
            gene: insertion.gene.id().to_string(),
            orientation: insertion.orientation,
            strand,
        }
    }
}

/// One biological insertion event observed in one or more samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedInsertion {
    /// `MI_<n>`, numbered in genomic order.
    pub id: String,
    pub gene: GeneLink,
    pub orientation: Option<Orientation>,
    pub seqname: String,
    /// Union of the member intervals.
    pub start: u64,
    pub end: u64,
    /// Shared strand of the members, if they agree.
    pub strand: Option<Strand>,
    /// Contributing samples, sorted.
    pub samples: Vec<String>,
    /// Evidence records over the kept entries.
    pub support: usize,
}

impl MergedInsertion {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }
}

/// One (sample, annotated insertion) row of the cohort table.
#[derive(Debug, Clone)]
pub struct CohortEntry {
    pub sample: String,
    pub insertion: AnnotatedInsertion,
    pub merged: Arc<MergedInsertion>,
}

/// Merged cohort: entries, the merged identities they share, and the
/// entries dropped because their sample already had a better one in the
/// same merged insertion.
#[derive(Debug, Clone, Default)]
pub struct CohortTable {
    pub entries: Vec<CohortEntry>,
    pub suppressed: Vec<CohortEntry>,
    pub merged: Vec<Arc<MergedInsertion>>,
    /// Samples that made it into the cohort, sorted. Includes samples
    /// without any insertion.
    pub samples: Vec<String>,
    /// Samples the caller intended to run.
    pub expected_samples: usize,
    /// Cross-sample merge edges that joined two components.
    pub n_edges: usize,
}

impl CohortTable {
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Fewer samples than intended (some were aborted or missing).
    pub fn is_partial(&self) -> bool {
        self.samples.len() < self.expected_samples
    }
}

/// Reconciles annotated insertions across samples.
///
/// Single-threaded: the union-find spans every sample.
pub struct CohortMerger {
    config: MergeConfig,
}

impl CohortMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Merge per-sample insertions into a cohort table.
    ///
    /// Two insertions from different samples are joined when they share a
    /// merge key and their intervals are at most `tolerance` apart. Merged
    /// identities are the connected components of that relation, so the
    /// grouping is transitive even when the ends of a chain are far apart.
    pub fn merge(&self, inputs: Vec<SampleInsertions>, expected_samples: Option<usize>) -> CohortTable {
        let mut samples: Vec<String> = inputs.iter().map(|s| s.sample.clone()).collect();
        samples.sort();
        samples.dedup();

        let expected = match expected_samples {
            Some(n) if n < samples.len() => {
                log::warn!(
                    "Expected {} samples but {} were supplied; using {}",
                    n,
                    samples.len(),
                    samples.len()
                );
                samples.len()
            }
            Some(n) => n,
            None => samples.len(),
        };

        let items: Vec<AnnotatedInsertion> = inputs.into_iter().flat_map(|s| s.insertions).collect();

        let mut groups: BTreeMap<MergeKey, Vec<usize>> = BTreeMap::new();
        for (idx, insertion) in items.iter().enumerate() {
            groups.entry(MergeKey::of(insertion)).or_default().push(idx);
        }

        let mut uf = UnionFind::new(items.len());
        let mut n_edges = 0;
        for members in groups.values_mut() {
            members.sort_by(|&a, &b| position_order(&items[a], &items[b]));
            n_edges += self.link_group(&items, members, &mut uf);
        }

        let mut components = uf.components();
        for component in &mut components {
            component.sort_by(|&a, &b| position_order(&items[a], &items[b]));
        }
        components.sort_by(|a, b| component_order(&items, a, b));

        let mut table = CohortTable {
            samples,
            expected_samples: expected,
            n_edges,
            ..Default::default()
        };

        for (n, component) in components.iter().enumerate() {
            self.emit_component(format!("MI_{}", n + 1), &items, component, &mut table);
        }

        log::info!(
            "Merged {} annotated insertions from {} samples into {} merged insertions ({} suppressed)",
            items.len(),
            table.n_samples(),
            table.merged.len(),
            table.suppressed.len()
        );
        if table.is_partial() {
            log::warn!(
                "Partial cohort: {} of {} expected samples",
                table.n_samples(),
                table.expected_samples
            );
        }

        table
    }

    /// Re-merge a merged table, including its suppressed entries.
    ///
    /// Merging is a function of the member set, so the result has the same
    /// merged identities as `table`.
    pub fn merge_table(&self, table: &CohortTable) -> CohortTable {
        let mut by_sample: BTreeMap<String, Vec<AnnotatedInsertion>> = table
            .samples
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();
        for entry in table.entries.iter().chain(&table.suppressed) {
            by_sample
                .entry(entry.sample.clone())
                .or_default()
                .push(entry.insertion.clone());
        }

        let inputs = by_sample
            .into_iter()
            .map(|(sample, insertions)| SampleInsertions { sample, insertions })
            .collect();
        self.merge(inputs, Some(table.expected_samples))
    }

    /// Add merge edges within one key group (sorted by start).
    ///
    /// Sweeps with an active list of earlier insertions whose end is still
    /// within tolerance of the current start.
    fn link_group(&self, items: &[AnnotatedInsertion], members: &[usize], uf: &mut UnionFind) -> usize {
        let tolerance = self.config.tolerance;
        let mut active: Vec<usize> = Vec::new();
        let mut n_edges = 0;

        for &i in members {
            let current = &items[i];
            active.retain(|&j| items[j].call.end.saturating_add(tolerance) >= current.call.start);

            for &j in &active {
                let other = &items[j];
                if other.sample() != current.sample()
                    && other.call.gap_to(current.call.start, current.call.end) <= tolerance
                    && uf.union(i, j)
                {
                    n_edges += 1;
                }
            }
            active.push(i);
        }

        n_edges
    }

    fn emit_component(
        &self,
        id: String,
        items: &[AnnotatedInsertion],
        component: &[usize],
        table: &mut CohortTable,
    ) {
        // Best entry per sample; the rest are suppressed
        let mut best: BTreeMap<&str, usize> = BTreeMap::new();
        for &idx in component {
            let sample = items[idx].sample();
            match best.get(sample) {
                Some(&current) if preference(&items[idx], &items[current]) != Ordering::Greater => {}
                _ => {
                    best.insert(sample, idx);
                }
            }
        }

        let first = &items[component[0]];
        let start = component.iter().map(|&i| items[i].call.start).min().unwrap_or(first.call.start);
        let end = component.iter().map(|&i| items[i].call.end).max().unwrap_or(first.call.end);
        let strand = if component.iter().all(|&i| items[i].call.strand == first.call.strand) {
            Some(first.call.strand)
        } else {
            None
        };

        let merged = Arc::new(MergedInsertion {
            id,
            gene: first.gene.clone(),
            orientation: first.orientation,
            seqname: first.call.seqname.clone(),
            start,
            end,
            strand,
            samples: best.keys().map(|s| s.to_string()).collect(),
            support: best.values().map(|&i| items[i].call.support()).sum(),
        });

        for (&sample, &idx) in &best {
            table.entries.push(CohortEntry {
                sample: sample.to_string(),
                insertion: items[idx].clone(),
                merged: Arc::clone(&merged),
            });
        }

        for &idx in component {
            let insertion = &items[idx];
            let winner = best[insertion.sample()];
            if winner == idx {
                continue;
            }
            log::debug!(
                "{}: suppressed {} (confidence {:.3}) in favour of {} (confidence {:.3})",
                merged.id,
                insertion.call.id,
                insertion.call.confidence,
                items[winner].call.id,
                items[winner].call.confidence
            );
            table.suppressed.push(CohortEntry {
                sample: insertion.sample().to_string(),
                insertion: insertion.clone(),
                merged: Arc::clone(&merged),
            });
        }

        table.merged.push(merged);
    }
}

fn position_order(a: &AnnotatedInsertion, b: &AnnotatedInsertion) -> Ordering {
    (a.call.start, a.call.end, a.sample(), &a.call.id).cmp(&(b.call.start, b.call.end, b.sample(), &b.call.id))
}

/// Components in genomic order; each component is already position-sorted.
fn component_order(items: &[AnnotatedInsertion], a: &[usize], b: &[usize]) -> Ordering {
    let first_a = &items[a[0]];
    let first_b = &items[b[0]];
    MergeKey::of(first_a)
        .seqname
        .cmp(&MergeKey::of(first_b).seqname)
        .then_with(|| position_order(first_a, first_b))
        .then_with(|| MergeKey::of(first_a).cmp(&MergeKey::of(first_b)))
}

/// `Greater` when `a` should be kept over `b`.
fn preference(a: &AnnotatedInsertion, b: &AnnotatedInsertion) -> Ordering {
    a.call
        .confidence
        .total_cmp(&b.call.confidence)
        .then_with(|| a.call.support().cmp(&b.call.support()))
        .then_with(|| b.call.id.cmp(&a.call.id))
}
