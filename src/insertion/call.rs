// InsertionCall data structure

use std::collections::BTreeSet;

use crate::evidence::{Evidence, JunctionQuality, Strand};
use crate::insertion::score::confidence_score;

/// A clustered set of evidence describing one insertion in one sample.
///
/// `start`/`end` (1-based, inclusive) bound the positions of the member
/// evidence. A call always owns at least one evidence record.
#[derive(Debug, Clone)]
pub struct InsertionCall {
    pub id: String,
    pub sample: String,
    pub seqname: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub features: BTreeSet<String>,
    pub confidence: f64,
    evidence: Vec<Evidence>,
}

impl InsertionCall {
    /// Build a call from a non-empty cluster of evidence sharing chromosome
    /// and strand. Returns `None` for an empty cluster.
    pub fn from_cluster(id: String, sample: &str, evidence: Vec<Evidence>) -> Option<Self> {
        let first = evidence.first()?;
        let seqname = first.seqname.clone();
        let strand = first.strand;

        let start = evidence.iter().map(|e| e.position).min()?;
        let end = evidence.iter().map(|e| e.position).max()?;
        let features = evidence
            .iter()
            .map(|e| e.transposon.feature.clone())
            .collect();
        let confidence = confidence_score(&evidence);

        Some(Self {
            id,
            sample: sample.to_string(),
            seqname,
            start,
            end,
            strand,
            features,
            confidence,
            evidence,
        })
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Number of supporting evidence records
    pub fn support(&self) -> usize {
        self.evidence.len()
    }

    pub fn support_of(&self, quality: JunctionQuality) -> usize {
        self.evidence.iter().filter(|e| e.junction == quality).count()
    }

    /// Fraction of evidence with an exact split junction
    pub fn exact_fraction(&self) -> f64 {
        self.support_of(JunctionQuality::Exact) as f64 / self.support() as f64
    }

    /// Comma-separated transposon features, for tabular output.
    pub fn feature_list(&self) -> String {
        self.features.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Gap between this call and an interval on the same chromosome.
    pub fn gap_to(&self, start: u64, end: u64) -> u64 {
        interval_gap(self.start, self.end, start, end)
    }
}

/// Distance between two closed intervals; 0 when they overlap.
pub fn interval_gap(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> u64 {
    if a_end < b_start {
        b_start - a_end
    } else if b_end < a_start {
        a_start - b_end
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::tests::record;

    fn evidence(position: u64, junction: &str) -> Evidence {
        let mut rec = record("chr1", position, "+", &format!("r{position}"));
        rec.junction = Some(junction.to_string());
        rec.validate().unwrap()
    }

    #[test]
    fn test_from_cluster_bounds() {
        let call = InsertionCall::from_cluster(
            "S1.1".into(),
            "S1",
            vec![evidence(150, "exact"), evidence(100, "soft_clip"), evidence(180, "exact")],
        )
        .unwrap();
        assert_eq!(call.start, 100);
        assert_eq!(call.end, 180);
        assert_eq!(call.support(), 3);
        assert_eq!(call.support_of(JunctionQuality::Exact), 2);
        assert!((call.exact_fraction() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(call.feature_list(), "X");
        assert_eq!(call.strand, Strand::Forward);
    }

    #[test]
    fn test_empty_cluster_yields_nothing() {
        assert!(InsertionCall::from_cluster("S1.1".into(), "S1", Vec::new()).is_none());
    }

    #[test]
    fn test_interval_gap() {
        assert_eq!(interval_gap(100, 200, 150, 300), 0);
        assert_eq!(interval_gap(100, 200, 250, 300), 50);
        assert_eq!(interval_gap(250, 300, 100, 200), 50);
        assert_eq!(interval_gap(100, 100, 100, 100), 0);
    }
}
