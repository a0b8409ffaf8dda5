//! Small numeric helpers shared by the aggregators.

/// Arithmetic mean, or `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    Some(values.iter().sum::<f64>() / n)
}

/// Quantile `q` in `[0, 1]` with linear interpolation between closest
/// ranks. `None` for an empty slice.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (position.floor() as usize, position.ceil() as usize);
    let fraction = position - position.floor();

    Some(fraction.mul_add(sorted[hi] - sorted[lo], sorted[lo]))
}

/// Percentile rank of each value within `values`, in input order.
///
/// Ties share the average of the ranks they span; the result is
/// `rank / n`, so the largest value has percentile 1 and no value has 0.
#[must_use]
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;

    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]].total_cmp(&values[order[start]]).is_eq() {
            end += 1;
        }

        // 1-based ranks start+1 ..= end averaged.
        #[allow(clippy::cast_precision_loss)]
        let average = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = average;
        }

        start = end;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    ranks.into_iter().map(|rank| rank / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }

    #[test]
    fn quantile_interpolates() {
        let values = [400.0, 100.0, 300.0, 200.0];
        assert_eq!(quantile(&values, 0.75), Some(325.0));
        assert_eq!(quantile(&values, 0.0), Some(100.0));
        assert_eq!(quantile(&values, 1.0), Some(400.0));
        assert_eq!(quantile(&[7.0], 0.75), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn percentile_ranks_average_ties() {
        let pct = percentile_ranks(&[10.0, 30.0, 20.0, 30.0]);
        assert_eq!(pct, vec![0.25, 0.875, 0.5, 0.875]);
    }

    #[test]
    fn percentile_ranks_all_equal() {
        let pct = percentile_ranks(&[5.0, 5.0, 5.0]);
        assert!(pct.iter().all(|p| (p - 2.0 / 3.0).abs() < 1e-12));
        assert!(percentile_ranks(&[]).is_empty());
    }
}
