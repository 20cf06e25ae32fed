//! Global confidence in the evidence behind the current positions.

use serde::{Deserialize, Serialize};

use crate::adm::config::ConfidenceConfig;
use crate::adm::modeling::history::PerformanceHistory;
use crate::adm::modeling::recency::weighted_std_dev;
use crate::adm::types::{AdaptationDirection, ConfidenceComponents};

/// Last adaptation direction and how many consecutive rounds it has held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionTracker {
    pub last_direction: AdaptationDirection,
    pub stable_count: u32,
}

impl DirectionTracker {
    pub fn new(last_direction: AdaptationDirection, stable_count: u32) -> Self {
        Self {
            last_direction,
            stable_count,
        }
    }

    /// Returns true when `direction` reverses a non-stable streak.
    pub fn record(&mut self, direction: AdaptationDirection) -> bool {
        let reversal = direction.is_reversal_of(self.last_direction);
        if direction == self.last_direction {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.last_direction = direction;
            self.stable_count = 1;
        }
        reversal
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Adaptation thresholds around the target, widened when confidence is low.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveThresholds {
    pub increase: f64,
    pub decrease: f64,
}

pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl Default for ConfidenceEstimator {
    fn default() -> Self {
        Self::new(ConfidenceConfig::default())
    }
}

impl ConfidenceEstimator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn components(
        &self,
        history: &PerformanceHistory,
        direction: &DirectionTracker,
        now_ms: i64,
    ) -> ConfidenceComponents {
        if history.is_empty() {
            return ConfidenceComponents {
                history: 0.0,
                variance: 0.0,
                direction: 0.0,
                total: self.config.empty_history_confidence,
            };
        }

        let weights = history.weights(now_ms);
        let effective_count: f64 = weights.iter().sum();
        let history_component = (effective_count / self.config.baseline_count).min(1.0);

        let std_dev = weighted_std_dev(&history.scores(), &weights);
        let variance_component = 1.0 - (std_dev / self.config.variance_normalizer).min(1.0);

        // A stale streak decays with the age of the latest round.
        let latest_weight = weights.last().copied().unwrap_or(0.0);
        let streak = (direction.stable_count as f64 / self.config.max_stable_count as f64).min(1.0);
        let direction_component = streak * latest_weight;

        let total = self.config.history_weight * history_component
            + self.config.variance_weight * variance_component
            + self.config.direction_weight * direction_component;

        ConfidenceComponents {
            history: history_component,
            variance: variance_component,
            direction: direction_component,
            total: total.clamp(0.0, 1.0),
        }
    }

    pub fn confidence(
        &self,
        history: &PerformanceHistory,
        direction: &DirectionTracker,
        now_ms: i64,
    ) -> f64 {
        self.components(history, direction, now_ms).total
    }

    pub fn effective_thresholds(
        &self,
        confidence: f64,
        target: f64,
        increase_margin: f64,
        decrease_margin: f64,
    ) -> EffectiveThresholds {
        let widening = self.config.threshold_widening * (1.0 - confidence.clamp(0.0, 1.0));
        EffectiveThresholds {
            increase: target + increase_margin + widening,
            decrease: target - decrease_margin - widening,
        }
    }
}
