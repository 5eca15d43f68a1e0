/// GTF file parsing for gene annotations
///
/// Supports standard GTF format (tab-separated, 9 columns):
/// 1. seqname (chromosome)
/// 2. source (ignored)
/// 3. feature (gene, exon; others ignored)
/// 4. start (1-based inclusive)
/// 5. end (1-based inclusive)
/// 6. score (ignored)
/// 7. strand (+, -, .)
/// 8. frame (ignored)
/// 9. attributes (semicolon-separated key-value pairs)
use crate::annotation::index::Gene;
use crate::error::Error;
use crate::evidence::Strand;
use crate::io::open_input;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// GTF record (single line)
#[derive(Debug, Clone)]
pub struct GtfRecord {
    pub seqname: String,
    pub feature: String,
    pub start: u64,
    pub end: u64,
    pub strand: char,
    pub attributes: HashMap<String, String>,
}

/// Parse a GTF file and keep gene and exon features
pub fn parse_gtf(path: &Path) -> Result<Vec<GtfRecord>, Error> {
    let reader = open_input(path)
        .map_err(|e| Error::Gtf(format!("Failed to open GTF file: {}", e)))?;

    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_num = idx + 1;
        let line =
            line.map_err(|e| Error::Gtf(format!("Failed to read line {}: {}", line_num, e)))?;

        // Skip comments and empty lines
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_gtf_line(line) {
            Ok(record) => {
                if record.feature.eq_ignore_ascii_case("gene")
                    || record.feature.eq_ignore_ascii_case("exon")
                {
                    records.push(record);
                }
            }
            Err(e) => {
                log::warn!("Skipping malformed GTF line {}: {}", line_num, e);
                continue;
            }
        }
    }

    Ok(records)
}

/// Parse a single GTF line
fn parse_gtf_line(line: &str) -> Result<GtfRecord, Error> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() < 9 {
        return Err(Error::Gtf(format!(
            "GTF line has {} fields, expected 9",
            fields.len()
        )));
    }

    let seqname = fields[0].to_string();
    let feature = fields[2].to_string();
    let start = fields[3]
        .parse::<u64>()
        .map_err(|e| Error::Gtf(format!("Invalid start position: {}", e)))?;
    let end = fields[4]
        .parse::<u64>()
        .map_err(|e| Error::Gtf(format!("Invalid end position: {}", e)))?;
    if end < start {
        return Err(Error::Gtf(format!("End {} before start {}", end, start)));
    }
    let strand = fields[6]
        .chars()
        .next()
        .ok_or_else(|| Error::Gtf("Empty strand field".to_string()))?;

    let attributes = parse_attributes(fields[8]);

    Ok(GtfRecord {
        seqname,
        feature,
        start,
        end,
        strand,
        attributes,
    })
}

/// Parse GTF attributes field
///
/// Format: key1 "value1"; key2 "value2";
fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();

    for pair in attr_str.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        // Split on first space to separate key and value
        let Some((key, value)) = pair.split_once(' ') else {
            continue;
        };

        attributes.insert(
            key.trim().to_string(),
            value.trim().trim_matches('"').to_string(),
        );
    }

    attributes
}

/// Assemble genes from gene and exon records
///
/// Gene records give the span, strand and name. Exons are grouped by
/// gene_id and kept as boundaries; a gene without a gene record takes the
/// span of its exons. Records without gene_id are skipped.
pub fn genes_from_records(records: Vec<GtfRecord>) -> Vec<Gene> {
    let mut genes: HashMap<String, Gene> = HashMap::new();

    for record in records {
        let Some(gene_id) = record.attributes.get("gene_id").cloned() else {
            log::warn!(
                "Skipping {} at {}:{} without gene_id",
                record.feature,
                record.seqname,
                record.start
            );
            continue;
        };

        let strand = match record.strand {
            '+' => Some(Strand::Forward),
            '-' => Some(Strand::Reverse),
            _ => None,
        };
        let name = record.attributes.get("gene_name").cloned();

        let gene = genes.entry(gene_id.clone()).or_insert_with(|| Gene {
            id: gene_id,
            name: name.clone(),
            seqname: record.seqname.clone(),
            start: record.start,
            end: record.end,
            strand,
            exons: Vec::new(),
        });

        if record.feature.eq_ignore_ascii_case("gene") {
            gene.start = record.start;
            gene.end = record.end;
            gene.strand = strand;
            if name.is_some() {
                gene.name = name;
            }
        } else {
            gene.start = gene.start.min(record.start);
            gene.end = gene.end.max(record.end);
            if gene.name.is_none() {
                gene.name = name;
            }
            gene.exons.push((record.start, record.end));
        }
    }

    let mut genes: Vec<Gene> = genes.into_values().collect();
    for gene in &mut genes {
        // Same exon can appear in multiple transcripts
        gene.exons.sort_unstable();
        gene.exons.dedup();
    }
    genes.sort_by(|a, b| {
        (&a.seqname, a.start, &a.id).cmp(&(&b.seqname, b.start, &b.id))
    });
    genes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_attributes() {
        let attr = r#"gene_id "ENSG001"; transcript_id "ENST001"; gene_name "MYC";"#;
        let attrs = parse_attributes(attr);

        assert_eq!(attrs.get("gene_id"), Some(&"ENSG001".to_string()));
        assert_eq!(attrs.get("transcript_id"), Some(&"ENST001".to_string()));
        assert_eq!(attrs.get("gene_name"), Some(&"MYC".to_string()));
    }

    #[test]
    fn test_parse_attributes_no_trailing_semicolon() {
        let attr = r#"gene_id "ENSG001"; transcript_id "ENST001""#;
        let attrs = parse_attributes(attr);

        assert_eq!(attrs.get("gene_id"), Some(&"ENSG001".to_string()));
        assert_eq!(attrs.get("transcript_id"), Some(&"ENST001".to_string()));
    }

    #[test]
    fn test_parse_gtf_line_valid() {
        let line = "chr1\ttest\tgene\t100\t200\t.\t+\t.\tgene_id \"G1\"; gene_name \"Myc\";";
        let record = parse_gtf_line(line).unwrap();

        assert_eq!(record.seqname, "chr1");
        assert_eq!(record.feature, "gene");
        assert_eq!(record.start, 100);
        assert_eq!(record.end, 200);
        assert_eq!(record.strand, '+');
        assert_eq!(record.attributes.get("gene_name"), Some(&"Myc".to_string()));
    }

    #[test]
    fn test_parse_gtf_line_invalid() {
        assert!(parse_gtf_line("chr1\ttest\texon").is_err());
        assert!(parse_gtf_line("chr1\tt\texon\t300\t200\t.\t+\t.\tgene_id \"G1\";").is_err());
    }

    #[test]
    fn test_parse_gtf_keeps_genes_and_exons() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "chr1\ttest\tgene\t50\t300\t.\t+\t.\tgene_id \"G1\";").unwrap();
        writeln!(file, "chr1\ttest\ttranscript\t50\t300\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";").unwrap();
        writeln!(file, "chr1\ttest\texon\t50\t100\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";").unwrap();
        writeln!(file, "chr1\ttest\tCDS\t60\t100\t.\t+\t0\tgene_id \"G1\"; transcript_id \"T1\";").unwrap();

        let records = parse_gtf(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_genes_from_records() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\tt\tgene\t100\t900\t.\t-\t.\tgene_id \"G1\"; gene_name \"Alpha\";").unwrap();
        writeln!(file, "chr1\tt\texon\t100\t200\t.\t-\t.\tgene_id \"G1\"; transcript_id \"T1\";").unwrap();
        writeln!(file, "chr1\tt\texon\t800\t900\t.\t-\t.\tgene_id \"G1\"; transcript_id \"T1\";").unwrap();
        writeln!(file, "chr1\tt\texon\t100\t200\t.\t-\t.\tgene_id \"G1\"; transcript_id \"T2\";").unwrap();
        // Exon-only gene
        writeln!(file, "chr2\tt\texon\t10\t20\t.\t+\t.\tgene_id \"G2\"; transcript_id \"T3\";").unwrap();
        writeln!(file, "chr2\tt\texon\t40\t60\t.\t+\t.\tgene_id \"G2\"; transcript_id \"T3\";").unwrap();

        let genes = genes_from_records(parse_gtf(file.path()).unwrap());
        assert_eq!(genes.len(), 2);

        let g1 = &genes[0];
        assert_eq!(g1.id, "G1");
        assert_eq!(g1.name.as_deref(), Some("Alpha"));
        assert_eq!((g1.start, g1.end), (100, 900));
        assert_eq!(g1.strand, Some(Strand::Reverse));
        assert_eq!(g1.exons, vec![(100, 200), (800, 900)]);

        let g2 = &genes[1];
        assert_eq!(g2.id, "G2");
        assert_eq!((g2.start, g2.end), (10, 60));
        assert_eq!(g2.strand, Some(Strand::Forward));
    }
}
