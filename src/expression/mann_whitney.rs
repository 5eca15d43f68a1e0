// Mann-Whitney U test (Wilcoxon rank-sum)

use statrs::distribution::{ContinuousCDF, Normal};

/// Result of comparing a positive group against a negative group.
#[derive(Debug, Clone, PartialEq)]
pub struct RankSumResult {
    /// U statistic of the positive group.
    pub u: f64,
    /// U / (n_pos * n_neg): probability that a random positive value
    /// exceeds a random negative one (ties count half).
    pub auc: f64,
    pub z: f64,
    /// Two-sided, normal approximation with tie correction.
    pub p_value: f64,
}

/// Average ranks (1-based); tied values share the mean of their ranks.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Positions i..j (0-based) hold ranks i+1..=j
        let avg = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        i = j;
    }
    ranks
}

/// Sum of t^3 - t over groups of tied values.
fn tie_term(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
        .chunk_by(|a, b| a == b)
        .map(|run| {
            let t = run.len() as f64;
            t * t * t - t
        })
        .sum()
}

/// Compare `positive` against `negative`. Returns `None` if either group is
/// empty.
pub fn mann_whitney_u(positive: &[f64], negative: &[f64]) -> Option<RankSumResult> {
    if positive.is_empty() || negative.is_empty() {
        return None;
    }
    let n1 = positive.len() as f64;
    let n2 = negative.len() as f64;
    let n = n1 + n2;

    let combined: Vec<f64> = positive.iter().chain(negative).copied().collect();
    let ranks = average_ranks(&combined);
    let r1: f64 = ranks[..positive.len()].iter().sum();
    let u = r1 - n1 * (n1 + 1.0) / 2.0;

    let mean_u = n1 * n2 / 2.0;
    let ties = tie_term(&combined);
    let var_u = n1 * n2 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)));

    let (z, p_value) = if var_u > 0.0 {
        let z = (u - mean_u) / var_u.sqrt();
        let p = Normal::new(0.0, 1.0)
            .map(|normal| 2.0 * normal.cdf(-z.abs()))
            .unwrap_or(1.0);
        (z, p.min(1.0))
    } else {
        // Every value tied
        (0.0, 1.0)
    };

    Some(RankSumResult {
        u,
        auc: u / (n1 * n2),
        z,
        p_value,
    })
}

/// Median of a non-empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_ranks_with_ties() {
        let ranks = average_ranks(&[10.0, 20.0, 20.0, 5.0]);
        assert_eq!(ranks, vec![2.0, 3.5, 3.5, 1.0]);
    }

    #[test]
    fn test_separated_groups() {
        let pos = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let neg = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let r = mann_whitney_u(&pos, &neg).unwrap();
        assert_eq!(r.u, 36.0);
        assert_eq!(r.auc, 1.0);
        assert!(r.z > 0.0);
        // z = 18 / sqrt(39) = 2.882 -> p ~ 0.00395
        assert!((r.p_value - 0.00395).abs() < 1e-4);
    }

    #[test]
    fn test_symmetric_under_swap() {
        let a = [3.0, 8.0, 1.5, 9.0];
        let b = [2.0, 4.0, 4.0, 7.0, 0.5];
        let ab = mann_whitney_u(&a, &b).unwrap();
        let ba = mann_whitney_u(&b, &a).unwrap();
        assert!((ab.p_value - ba.p_value).abs() < 1e-12);
        assert!((ab.u + ba.u - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_tied_and_empty() {
        let r = mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(r.p_value, 1.0);
        assert!(mann_whitney_u(&[], &[1.0]).is_none());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
