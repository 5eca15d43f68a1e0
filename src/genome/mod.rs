use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;
use crate::io::tsv_reader;

/// Chromosome layout of the reference genome.
///
/// Chromosomes are laid end to end in a single linear coordinate space
/// (0-based, no padding) so that a genome-wide position can be drawn
/// uniformly and mapped back to a chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeLayout {
    /// Chromosome names.
    pub chr_name: Vec<String>,

    /// Chromosome lengths.
    pub chr_length: Vec<u64>,

    /// Start of each chromosome in the linear space.
    /// Length = n_chr + 1; the last entry is the total genome length.
    pub chr_start: Vec<u64>,
}

impl GenomeLayout {
    /// Build a layout from (name, length) pairs, keeping their order.
    /// Zero-length chromosomes are skipped.
    pub fn new(chromosomes: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut chr_name = Vec::new();
        let mut chr_length = Vec::new();
        let mut chr_start = vec![0u64];

        for (name, len) in chromosomes {
            if len == 0 {
                log::warn!("Skipping zero-length chromosome '{}'", name);
                continue;
            }
            let n = chr_start[chr_start.len() - 1];
            chr_name.push(name);
            chr_length.push(len);
            chr_start.push(n + len);
        }

        Self {
            chr_name,
            chr_length,
            chr_start,
        }
    }

    /// Read a chromosome sizes table (name<TAB>length, no header).
    pub fn from_chrom_sizes(path: &Path) -> Result<Self, Error> {
        let mut reader = tsv_reader(path, false)?;
        let mut chromosomes = Vec::new();

        for (line_num, result) in reader.records().enumerate() {
            let record = result?;
            let name = record.get(0).map(str::trim).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let len = record
                .get(1)
                .map(str::trim)
                .unwrap_or_default()
                .parse::<u64>()
                .map_err(|e| {
                    Error::Table(format!(
                        "{}:{}: invalid chromosome length: {}",
                        path.display(),
                        line_num + 1,
                        e
                    ))
                })?;
            chromosomes.push((name.to_string(), len));
        }

        let layout = Self::new(chromosomes);
        if layout.n_chr() == 0 {
            return Err(Error::Table(format!(
                "{}: no chromosomes found",
                path.display()
            )));
        }
        Ok(layout)
    }

    /// Layout covering the largest coordinate seen per chromosome.
    pub fn from_extents(extents: &BTreeMap<String, u64>) -> Self {
        Self::new(extents.iter().map(|(name, &end)| (name.clone(), end)))
    }

    pub fn n_chr(&self) -> usize {
        self.chr_name.len()
    }

    /// Total genome length.
    pub fn total_length(&self) -> u64 {
        self.chr_start[self.chr_start.len() - 1]
    }

    pub fn chr_len(&self, name: &str) -> Option<u64> {
        self.chr_name
            .iter()
            .position(|n| n == name)
            .map(|i| self.chr_length[i])
    }

    /// Map a linear 0-based position to (chromosome index, 1-based position).
    pub fn position_to_chr(&self, pos: u64) -> Option<(usize, u64)> {
        if pos >= self.total_length() {
            return None;
        }
        // chr_start is sorted; find the last start <= pos
        let idx = self.chr_start.partition_point(|&s| s <= pos) - 1;
        Some((idx, pos - self.chr_start[idx] + 1))
    }
}
