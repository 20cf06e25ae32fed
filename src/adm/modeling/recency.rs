//! Recency-weighted statistics.
//!
//! A sample of age `a` hours gets weight `2^(-a / half_life)`. All helpers
//! return neutral values (0) for empty or degenerate input and fall back to
//! uniform weights when the weights sum to zero.

const MS_PER_HOUR: f64 = 3_600_000.0;
const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyWeighting {
    half_life_hours: f64,
}

impl RecencyWeighting {
    pub fn new(half_life_hours: f64) -> Self {
        Self {
            half_life_hours: half_life_hours.max(EPSILON),
        }
    }

    pub fn half_life_hours(&self) -> f64 {
        self.half_life_hours
    }

    pub fn weight(&self, timestamp_ms: i64, now_ms: i64) -> f64 {
        let age_hours = (now_ms.saturating_sub(timestamp_ms)).max(0) as f64 / MS_PER_HOUR;
        (-age_hours * std::f64::consts::LN_2 / self.half_life_hours).exp()
    }

    pub fn weights<I>(&self, timestamps: I, now_ms: i64) -> Vec<f64>
    where
        I: IntoIterator<Item = i64>,
    {
        timestamps
            .into_iter()
            .map(|ts| self.weight(ts, now_ms))
            .collect()
    }
}

fn effective_weights(weights: &[f64], len: usize) -> Vec<f64> {
    let usable = weights.len() == len
        && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
        && weights.iter().sum::<f64>() > EPSILON;
    if usable {
        weights.to_vec()
    } else {
        vec![1.0; len]
    }
}

pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let w = effective_weights(weights, values.len());
    let total: f64 = w.iter().sum();
    values.iter().zip(&w).map(|(v, w)| v * w).sum::<f64>() / total
}

pub fn weighted_variance(values: &[f64], weights: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let w = effective_weights(weights, values.len());
    let total: f64 = w.iter().sum();
    let mean = values.iter().zip(&w).map(|(v, w)| v * w).sum::<f64>() / total;
    let variance = values
        .iter()
        .zip(&w)
        .map(|(v, w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    variance.max(0.0)
}

pub fn weighted_std_dev(values: &[f64], weights: &[f64]) -> f64 {
    weighted_variance(values, weights).sqrt()
}

/// Unweighted population standard deviation.
pub fn standard_deviation(values: &[f64]) -> f64 {
    weighted_std_dev(values, &[])
}

/// Weighted least-squares slope of `ys` against `xs`.
///
/// Returns 0 below `min_points` points (never fewer than two) or when the
/// `xs` have no spread.
pub fn weighted_slope(xs: &[f64], ys: &[f64], weights: &[f64], min_points: usize) -> f64 {
    let n = xs.len().min(ys.len());
    if n < min_points.max(2) {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let w = effective_weights(&weights[..weights.len().min(n)], n);
    let total: f64 = w.iter().sum();

    let x_mean = xs.iter().zip(&w).map(|(x, w)| x * w).sum::<f64>() / total;
    let y_mean = ys.iter().zip(&w).map(|(y, w)| y * w).sum::<f64>() / total;

    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        let dx = xs[i] - x_mean;
        num += w[i] * dx * (ys[i] - y_mean);
        den += w[i] * dx * dx;
    }

    if den.abs() < EPSILON {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    #[test]
    fn test_weight_halves_each_half_life() {
        let weighting = RecencyWeighting::new(2.0);
        let now = 10 * HOUR_MS;
        assert!((weighting.weight(now, now) - 1.0).abs() < 1e-12);
        assert!((weighting.weight(now - 2 * HOUR_MS, now) - 0.5).abs() < 1e-9);
        assert!((weighting.weight(now - 4 * HOUR_MS, now) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let weighting = RecencyWeighting::new(1.0);
        assert_eq!(weighting.weight(5_000, 1_000), 1.0);
    }

    #[test]
    fn test_std_dev_of_empty_and_single_is_zero() {
        assert_eq!(standard_deviation(&[]), 0.0);
        assert_eq!(standard_deviation(&[0.7]), 0.0);
        assert_eq!(weighted_variance(&[0.3], &[1.0]), 0.0);
    }

    #[test]
    fn test_weighted_mean_prefers_heavy_samples() {
        let mean = weighted_mean(&[0.0, 1.0], &[1.0, 3.0]);
        assert!((mean - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_fall_back_to_uniform() {
        let mean = weighted_mean(&[0.2, 0.4], &[0.0, 0.0]);
        assert!((mean - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_slope_sign_follows_relationship() {
        let xs = [0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        let rising = [0.3, 0.38, 0.47, 0.55, 0.64, 0.72, 0.81, 0.9];
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        let flat = [0.6; 8];
        // Later samples weigh no more than earlier ones.
        let weights: Vec<f64> = (0..8).map(|i| 1.0 - i as f64 * 0.05).collect();

        assert!(weighted_slope(&xs, &rising, &weights, 7) > 0.0);
        assert!(weighted_slope(&xs, &falling, &weights, 7) < 0.0);
        assert!(weighted_slope(&xs, &flat, &weights, 7).abs() < 0.001);
    }

    #[test]
    fn test_slope_without_x_spread_is_zero() {
        let xs = [0.5; 8];
        let ys = [0.1, 0.9, 0.2, 0.8, 0.3, 0.7, 0.4, 0.6];
        assert_eq!(weighted_slope(&xs, &ys, &[], 2), 0.0);
    }

    #[test]
    fn test_slope_needs_min_points() {
        let xs = [0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        let ys = [0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        assert_eq!(weighted_slope(&xs, &ys, &[], 7), 0.0);
        assert!((weighted_slope(&xs, &ys, &[], 3) - 1.0).abs() < 1e-9);
        assert!((weighted_slope(&xs[..2], &ys[..2], &[], 0) - 1.0).abs() < 1e-9);
        assert_eq!(weighted_slope(&xs[..1], &ys[..1], &[], 0), 0.0);
    }
}
