// Insertion call confidence scoring

use crate::evidence::{Evidence, JunctionQuality};

/// Confidence of an insertion call in [0, 1).
///
/// Each record contributes its junction weight (exact > soft-clipped >
/// spanning); the summed weight `w` maps to `1 - exp(-w)`. Adding a record
/// or upgrading a record's junction class never lowers the score, and a
/// singleton call always sits at the bottom of the scale for its class.
pub fn confidence_score(evidence: &[Evidence]) -> f64 {
    let weight: f64 = evidence.iter().map(|e| e.junction.weight()).sum();
    weight_to_confidence(weight)
}

/// Same score from per-class counts.
pub fn confidence_from_counts(exact: usize, soft_clipped: usize, spanning: usize) -> f64 {
    let weight = exact as f64 * JunctionQuality::Exact.weight()
        + soft_clipped as f64 * JunctionQuality::SoftClipped.weight()
        + spanning as f64 * JunctionQuality::Spanning.weight();
    weight_to_confidence(weight)
}

fn weight_to_confidence(weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    1.0 - (-weight).exp()
}
