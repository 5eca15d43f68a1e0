// Per-sample, per-gene expression matrix

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::io::tsv_reader;

/// Expression values keyed by (gene, sample). Missing cells are `None`.
#[derive(Debug, Clone, Default)]
pub struct ExpressionMatrix {
    samples: Vec<String>,
    sample_index: HashMap<String, usize>,
    genes: HashMap<String, Vec<Option<f64>>>,
}

impl ExpressionMatrix {
    pub fn new(samples: Vec<String>) -> Self {
        let sample_index = samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Self {
            samples,
            sample_index,
            genes: HashMap::new(),
        }
    }

    /// Read a gene x sample table: header `gene_id<TAB>sample...`, one row
    /// per gene. `NA` and empty cells are missing values.
    pub fn from_tsv(path: &Path) -> Result<Self, Error> {
        let mut reader = tsv_reader(path, true)?;
        let header = reader.headers()?.clone();
        if header.len() < 2 {
            return Err(Error::Table(format!(
                "{}: expression matrix needs a gene column and at least one sample",
                path.display()
            )));
        }

        let mut matrix = Self::new(header.iter().skip(1).map(|s| s.trim().to_string()).collect());

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let gene_id = record.get(0).map(str::trim).unwrap_or_default();
            if gene_id.is_empty() {
                continue;
            }

            let mut values = Vec::with_capacity(matrix.samples.len());
            for col in 0..matrix.samples.len() {
                let cell = record.get(col + 1).unwrap_or_default();
                let value = parse_cell(cell).map_err(|reason| {
                    Error::Table(format!(
                        "{}: row {} ({}), sample {}: {}",
                        path.display(),
                        row + 2,
                        gene_id,
                        matrix.samples[col],
                        reason
                    ))
                })?;
                values.push(value);
            }
            matrix.insert(gene_id, values);
        }

        log::info!(
            "Loaded expression for {} genes x {} samples from {}",
            matrix.n_genes(),
            matrix.samples.len(),
            path.display()
        );
        Ok(matrix)
    }

    /// Add or replace one gene's row (one value per sample, in order).
    pub fn insert(&mut self, gene_id: &str, values: Vec<Option<f64>>) {
        if self.genes.insert(gene_id.to_string(), values).is_some() {
            log::warn!("Duplicate expression row for gene '{}'; keeping the last", gene_id);
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn has_gene(&self, gene_id: &str) -> bool {
        self.genes.contains_key(gene_id)
    }

    /// Value for (gene, sample); `None` if either is absent or the cell is
    /// missing.
    pub fn value(&self, gene_id: &str, sample: &str) -> Option<f64> {
        let col = *self.sample_index.get(sample)?;
        self.genes.get(gene_id)?.get(col).copied().flatten()
    }
}

fn parse_cell(cell: &str) -> Result<Option<f64>, String> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("NA") || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .map_err(|e| format!("invalid expression value '{}': {}", cell, e))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("expression value {} is not a non-negative number", value));
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("12.5"), Ok(Some(12.5)));
        assert_eq!(parse_cell("NA"), Ok(None));
        assert_eq!(parse_cell(""), Ok(None));
        assert!(parse_cell("-1").is_err());
        assert!(parse_cell("high").is_err());
    }

    #[test]
    fn test_from_tsv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tS1\tS2\tS3").unwrap();
        writeln!(file, "G1\t10\tNA\t3.5").unwrap();
        writeln!(file, "G2\t0\t1\t").unwrap();

        let m = ExpressionMatrix::from_tsv(file.path()).unwrap();
        assert_eq!(m.samples(), &["S1", "S2", "S3"]);
        assert_eq!(m.n_genes(), 2);
        assert_eq!(m.value("G1", "S1"), Some(10.0));
        assert_eq!(m.value("G1", "S2"), None);
        assert_eq!(m.value("G2", "S3"), None);
        assert_eq!(m.value("G2", "S9"), None);
        assert!(!m.has_gene("G3"));
    }

    #[test]
    fn test_negative_value_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tS1").unwrap();
        writeln!(file, "G1\t-4").unwrap();
        assert!(matches!(
            ExpressionMatrix::from_tsv(file.path()),
            Err(Error::Table(_))
        ));
    }
}
