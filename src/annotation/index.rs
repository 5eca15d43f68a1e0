// Read-only gene interval index

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::annotation::gtf::{genes_from_records, parse_gtf};
use crate::error::Error;
use crate::evidence::Strand;
use crate::insertion::interval_gap;

/// An annotated gene (1-based, inclusive coordinates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    pub id: String,
    pub name: Option<String>,
    pub seqname: String,
    pub start: u64,
    pub end: u64,
    /// `None` for genes annotated with strand '.'
    pub strand: Option<Strand>,
    /// Sorted, deduplicated exon intervals.
    pub exons: Vec<(u64, u64)>,
}

impl Gene {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Distance from an interval to the nearest exon boundary.
    ///
    /// Genes without exons use the gene boundaries. Returns 0 when a
    /// boundary falls inside the interval.
    pub fn boundary_distance(&self, start: u64, end: u64) -> u64 {
        let gene_bounds = [(self.start, self.end)];
        let intervals: &[(u64, u64)] = if self.exons.is_empty() {
            &gene_bounds
        } else {
            &self.exons
        };

        intervals
            .iter()
            .flat_map(|&(s, e)| [s, e])
            .map(|b| interval_gap(start, end, b, b))
            .min()
            .unwrap_or(0)
    }
}

/// Genes of one chromosome, sorted by start.
#[derive(Debug, Default)]
struct ChromGenes {
    /// Indices into `GeneIndex::genes`
    genes: Vec<usize>,
    /// Longest gene on the chromosome; bounds the backward scan in queries.
    max_len: u64,
}

/// Gene annotation index, queryable by overlap with a genomic interval.
///
/// Built once and shared read-only across samples and runs.
#[derive(Debug, Default)]
pub struct GeneIndex {
    genes: Vec<Gene>,
    by_chrom: HashMap<String, ChromGenes>,
    by_id: HashMap<String, usize>,
}

impl GeneIndex {
    /// Build an index from genes in any order.
    pub fn new(mut genes: Vec<Gene>) -> Self {
        genes.sort_by(|a, b| (&a.seqname, a.start, &a.id).cmp(&(&b.seqname, b.start, &b.id)));

        let mut by_chrom: HashMap<String, ChromGenes> = HashMap::new();
        let mut by_id = HashMap::new();

        for (idx, gene) in genes.iter().enumerate() {
            let chrom = by_chrom.entry(gene.seqname.clone()).or_default();
            chrom.genes.push(idx);
            chrom.max_len = chrom.max_len.max(gene.length());
            if by_id.insert(gene.id.clone(), idx).is_some() {
                log::warn!("Duplicate gene id '{}' in annotation", gene.id);
            }
        }

        Self {
            genes,
            by_chrom,
            by_id,
        }
    }

    /// Load genes from a GTF file.
    pub fn from_gtf(gtf_path: &Path) -> Result<Self, Error> {
        log::info!("Loading GTF annotations from: {}", gtf_path.display());

        let records = parse_gtf(gtf_path)?;
        log::debug!("Parsed {} gene/exon features from GTF", records.len());

        let genes = genes_from_records(records);
        log::info!("Indexed {} genes from GTF", genes.len());

        Ok(Self::new(genes))
    }

    /// All genes overlapping [start, end] on `seqname`.
    pub fn overlapping(&self, seqname: &str, start: u64, end: u64) -> Vec<&Gene> {
        let Some(chrom) = self.by_chrom.get(seqname) else {
            return Vec::new();
        };

        // Genes are sorted by start: everything at or after `upper` starts
        // past the query, and nothing starting before `start - max_len` can
        // reach it.
        let upper = chrom
            .genes
            .partition_point(|&i| self.genes[i].start <= end);
        let min_start = start.saturating_sub(chrom.max_len);

        let mut hits: Vec<&Gene> = chrom.genes[..upper]
            .iter()
            .rev()
            .map(|&i| &self.genes[i])
            .take_while(|g| g.start >= min_start)
            .filter(|g| g.end >= start)
            .collect();
        hits.reverse();
        hits
    }

    pub fn get(&self, gene_id: &str) -> Option<&Gene> {
        self.by_id.get(gene_id).map(|&i| &self.genes[i])
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Largest annotated coordinate per chromosome.
    pub fn extents(&self) -> BTreeMap<String, u64> {
        let mut extents = BTreeMap::new();
        for gene in &self.genes {
            let e = extents.entry(gene.seqname.clone()).or_insert(0);
            *e = (*e).max(gene.end);
        }
        extents
    }
}
