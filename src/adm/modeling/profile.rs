//! Per-DOM performance profiles.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::adm::modeling::recency::{
    weighted_mean, weighted_slope, weighted_std_dev, weighted_variance, RecencyWeighting,
};

pub const DEFAULT_PROFILE_CAPACITY: usize = 200;

/// Fewer samples than this give a zero slope.
pub const MIN_SLOPE_POINTS: usize = 7;

fn default_capacity() -> usize {
    DEFAULT_PROFILE_CAPACITY
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomProfileSample {
    pub timestamp: i64,
    pub dom_value: f64,
    pub performance: f64,
}

/// Recency-weighted view over a profile at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSnapshot {
    pub count: usize,
    pub weights: Vec<f64>,
    pub dom_values: Vec<f64>,
    pub performances: Vec<f64>,
}

impl ProfileSnapshot {
    pub fn mean_performance(&self) -> f64 {
        weighted_mean(&self.performances, &self.weights)
    }

    pub fn performance_std_dev(&self) -> f64 {
        weighted_std_dev(&self.performances, &self.weights)
    }

    pub fn dom_variance(&self) -> f64 {
        weighted_variance(&self.dom_values, &self.weights)
    }

    /// Slope of performance against DOM value; 0 below [`MIN_SLOPE_POINTS`].
    pub fn slope(&self) -> f64 {
        weighted_slope(
            &self.dom_values,
            &self.performances,
            &self.weights,
            MIN_SLOPE_POINTS,
        )
    }
}

/// Bounded buffer of (timestamp, DOM value, performance) samples for one DOM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomPerformanceProfile {
    #[serde(default)]
    samples: VecDeque<DomProfileSample>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

impl Default for DomPerformanceProfile {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PROFILE_CAPACITY)
    }
}

impl DomPerformanceProfile {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    pub fn record_performance(&mut self, dom_value: f64, performance: f64, timestamp: i64) {
        self.samples.push_back(DomProfileSample {
            timestamp,
            dom_value,
            performance,
        });
        self.evict();
    }

    fn evict(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn samples(&self) -> &VecDeque<DomProfileSample> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn snapshot(&self, weighting: &RecencyWeighting, now_ms: i64) -> ProfileSnapshot {
        ProfileSnapshot {
            count: self.samples.len(),
            weights: weighting.weights(self.samples.iter().map(|s| s.timestamp), now_ms),
            dom_values: self.samples.iter().map(|s| s.dom_value).collect(),
            performances: self.samples.iter().map(|s| s.performance).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_evicts_past_capacity() {
        let mut profile = DomPerformanceProfile::with_capacity(3);
        for i in 0..5 {
            profile.record_performance(i as f64 / 10.0, 0.5, i);
        }
        assert_eq!(profile.len(), 3);
        assert_eq!(profile.samples()[0].timestamp, 2);
    }

    #[test]
    fn test_default_capacity_is_two_hundred() {
        let mut profile = DomPerformanceProfile::default();
        for i in 0..250 {
            profile.record_performance(0.5, 0.5, i);
        }
        assert_eq!(profile.len(), DEFAULT_PROFILE_CAPACITY);
    }

    #[test]
    fn test_serialized_shape_omits_capacity() {
        let mut profile = DomPerformanceProfile::with_capacity(5);
        profile.record_performance(0.4, 0.7, 42);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["samples"][0]["domValue"], 0.4);
        assert!(json.get("capacity").is_none());

        let restored: DomPerformanceProfile = serde_json::from_value(json).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_snapshot_dom_variance() {
        let mut profile = DomPerformanceProfile::default();
        for _ in 0..8 {
            profile.record_performance(0.5, 0.6, 0);
        }
        let snapshot = profile.snapshot(&RecencyWeighting::new(0.35), 0);
        assert_eq!(snapshot.dom_variance(), 0.0);
        assert!((snapshot.mean_performance() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_slope_waits_for_enough_samples() {
        let mut profile = DomPerformanceProfile::default();
        for i in 0..MIN_SLOPE_POINTS - 1 {
            let value = 0.2 + 0.1 * i as f64;
            profile.record_performance(value, value, 0);
        }
        let weighting = RecencyWeighting::new(0.35);
        assert_eq!(profile.snapshot(&weighting, 0).slope(), 0.0);

        profile.record_performance(0.9, 0.9, 0);
        assert!((profile.snapshot(&weighting, 0).slope() - 1.0).abs() < 1e-9);
    }
}
