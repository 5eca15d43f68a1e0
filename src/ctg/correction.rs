//! Multiple testing correction.

/// Benjamini-Hochberg adjusted p-values (q-values), in input order.
///
/// Sorts p-values, adjusts as `p * n / rank`, enforces monotonicity from
/// right to left and clamps to 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n_f = n as f64;
    let mut adjusted = vec![0.0; n];
    let mut prev = f64::INFINITY;
    for i in (0..n).rev() {
        let rank = (i + 1) as f64;
        let adj = (p_values[indices[i]] * n_f / rank).min(1.0).min(prev);
        adjusted[indices[i]] = adj;
        prev = adj;
    }

    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_values() {
        let p = [0.01, 0.04, 0.03, 0.005];
        let q = benjamini_hochberg(&p);
        // sorted: 0.005, 0.01, 0.03, 0.04 -> 0.02, 0.02, 0.04, 0.04
        assert!((q[3] - 0.02).abs() < 1e-12);
        assert!((q[0] - 0.02).abs() < 1e-12);
        assert!((q[2] - 0.04).abs() < 1e-12);
        assert!((q[1] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_bh_q_not_below_p() {
        let p = [0.9, 0.2, 0.001, 0.5, 0.05, 1.0, 0.3];
        let q = benjamini_hochberg(&p);
        for (pi, qi) in p.iter().zip(&q) {
            assert!(qi >= pi);
            assert!(*qi <= 1.0);
        }
    }

    #[test]
    fn test_bh_empty_and_single() {
        assert!(benjamini_hochberg(&[]).is_empty());
        assert_eq!(benjamini_hochberg(&[0.3]), vec![0.3]);
    }
}
