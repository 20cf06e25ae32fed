//! Rolling ledger of scored rounds.

use crate::adm::config::HistoryConfig;
use crate::adm::modeling::recency::{weighted_mean, weighted_slope, weighted_variance, RecencyWeighting};
use crate::adm::types::PerformanceHistoryEntry;

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryMetrics {
    pub average: f64,
    /// Recency-weighted score-per-minute slope, scaled into [-1, 1].
    pub trend: f64,
    pub variance: f64,
}

/// Bounded, timestamp-ordered ledger of completed rounds.
#[derive(Debug, Clone)]
pub struct PerformanceHistory {
    config: HistoryConfig,
    weighting: RecencyWeighting,
    entries: Vec<PerformanceHistoryEntry>,
}

impl PerformanceHistory {
    pub fn new(config: HistoryConfig, weighting: RecencyWeighting) -> Self {
        Self {
            config,
            weighting,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(
        config: HistoryConfig,
        weighting: RecencyWeighting,
        entries: Vec<PerformanceHistoryEntry>,
    ) -> Self {
        let mut history = Self::new(config, weighting);
        history.entries = entries;
        history.normalize();
        history
    }

    pub fn add_entry(&mut self, entry: PerformanceHistoryEntry) {
        self.entries.push(entry);
        self.normalize();
    }

    // Persisted and live entries may interleave, so order by time before trimming.
    fn normalize(&mut self) {
        self.entries.sort_by_key(|e| e.timestamp);
        if self.entries.len() > self.config.window_size {
            let excess = self.entries.len() - self.config.window_size;
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[PerformanceHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&PerformanceHistoryEntry> {
        self.entries.last()
    }

    pub fn weighting(&self) -> RecencyWeighting {
        self.weighting
    }

    pub fn scores(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.overall_performance).collect()
    }

    pub fn weights(&self, now_ms: i64) -> Vec<f64> {
        self.weighting
            .weights(self.entries.iter().map(|e| e.timestamp), now_ms)
    }

    /// Sum of recency weights; old entries count fractionally.
    pub fn effective_count(&self, now_ms: i64) -> f64 {
        self.weights(now_ms).iter().sum()
    }

    pub fn metrics(&self, now_ms: i64) -> HistoryMetrics {
        if self.entries.is_empty() {
            return HistoryMetrics::default();
        }

        let scores = self.scores();
        let weights = self.weights(now_ms);
        let average = weighted_mean(&scores, &weights);
        let variance = weighted_variance(&scores, &weights);

        let trend = if self.entries.len() < self.config.trend_min_entries {
            0.0
        } else {
            let origin = self.entries[0].timestamp;
            let minutes: Vec<f64> = self
                .entries
                .iter()
                .map(|e| (e.timestamp - origin) as f64 / MS_PER_MINUTE)
                .collect();
            let slope =
                weighted_slope(&minutes, &scores, &weights, self.config.trend_min_entries);
            (slope * self.config.trend_scale).clamp(-1.0, 1.0)
        };

        HistoryMetrics {
            average,
            trend,
            variance,
        }
    }

    /// Blends the raw score with the weighted average and a trend projection.
    pub fn adaptive_score(&self, current_raw_score: f64, now_ms: i64) -> f64 {
        if self.entries.len() < self.config.trend_min_entries {
            return current_raw_score;
        }

        let metrics = self.metrics(now_ms);
        let projected = current_raw_score + metrics.trend;
        let blended = self.config.current_weight * current_raw_score
            + self.config.history_weight * metrics.average
            + self.config.trend_weight * projected;

        blended.clamp(0.0, 1.0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    fn history() -> PerformanceHistory {
        PerformanceHistory::new(HistoryConfig::default(), RecencyWeighting::new(24.0))
    }

    #[test]
    fn test_window_evicts_oldest_by_timestamp() {
        let mut history = history();
        for i in 0..12 {
            history.add_entry(PerformanceHistoryEntry::new(1_000 + i * MINUTE_MS, 0.5));
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.entries()[0].timestamp, 1_000 + 2 * MINUTE_MS);
    }

    #[test]
    fn test_out_of_order_entry_is_sorted_before_trim() {
        let mut history = history();
        for i in 1..=10 {
            history.add_entry(PerformanceHistoryEntry::new(i * MINUTE_MS, 0.5));
        }
        // An entry older than everything else is the one evicted.
        history.add_entry(PerformanceHistoryEntry::new(0, 0.1));
        assert_eq!(history.len(), 10);
        assert!(history.entries().iter().all(|e| e.timestamp > 0));
        assert!(history.entries().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_trend_requires_minimum_history() {
        let mut history = history();
        history.add_entry(PerformanceHistoryEntry::new(0, 0.2));
        history.add_entry(PerformanceHistoryEntry::new(MINUTE_MS, 0.9));
        assert_eq!(history.metrics(2 * MINUTE_MS).trend, 0.0);
    }

    #[test]
    fn test_rising_scores_give_positive_trend() {
        let mut history = history();
        for i in 0..5 {
            history.add_entry(PerformanceHistoryEntry::new(i * MINUTE_MS, 0.4 + i as f64 * 0.05));
        }
        let metrics = history.metrics(5 * MINUTE_MS);
        assert!(metrics.trend > 0.0);
        assert!(metrics.trend <= 1.0);
    }

    #[test]
    fn test_adaptive_score_passthrough_when_short() {
        let mut history = history();
        history.add_entry(PerformanceHistoryEntry::new(0, 0.9));
        assert_eq!(history.adaptive_score(0.42, MINUTE_MS), 0.42);
    }

    #[test]
    fn test_adaptive_score_is_clamped() {
        let mut history = history();
        for i in 0..5 {
            history.add_entry(PerformanceHistoryEntry::new(i * MINUTE_MS, 0.8 + i as f64 * 0.05));
        }
        let score = history.adaptive_score(1.0, 5 * MINUTE_MS);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_effective_count_decays_with_age() {
        let weighting = RecencyWeighting::new(1.0);
        let mut history = PerformanceHistory::new(HistoryConfig::default(), weighting);
        history.add_entry(PerformanceHistoryEntry::new(0, 0.5));
        let count = history.effective_count(60 * MINUTE_MS);
        assert!((count - 0.5).abs() < 1e-9);
    }
}
