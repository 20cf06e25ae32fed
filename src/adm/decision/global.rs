//! Global adaptation path: one KPI score per round drives every DOM together.

use std::collections::BTreeMap;

use crate::adm::config::{GlobalPathConfig, KpiWeights};
use crate::adm::decision::phase::PhaseModulation;
use crate::adm::modeling::arousal::ArousalInterpolator;
use crate::adm::modeling::confidence::{ConfidenceEstimator, DirectionTracker, EffectiveThresholds};
use crate::adm::types::{AdaptationDirection, DomAdjustment, DomTargetType, Kpi, RoundInput};

#[derive(Debug, Clone, PartialEq)]
pub struct KpiScore {
    pub score: f64,
    pub normalized: BTreeMap<Kpi, f64>,
    pub weights: KpiWeights,
}

impl KpiScore {
    /// KPI map keyed by wire name, as stored in the history ledger.
    pub fn named(&self) -> BTreeMap<String, f64> {
        self.normalized
            .iter()
            .map(|(kpi, value)| (kpi.as_str().to_string(), *value))
            .collect()
    }
}

pub struct KpiScorer {
    config: GlobalPathConfig,
    arousal: ArousalInterpolator,
}

impl KpiScorer {
    pub fn new(config: GlobalPathConfig, arousal: ArousalInterpolator) -> Self {
        Self { config, arousal }
    }

    /// Every KPI mapped to [0, 1] with higher meaning better.
    pub fn normalize(&self, input: &RoundInput) -> BTreeMap<Kpi, f64> {
        let norm = &self.config.normalization;
        let inverse = |value: f64, max: f64| 1.0 - (value / max).clamp(0.0, 1.0);

        BTreeMap::from([
            (Kpi::TaskSuccess, if input.task_success { 1.0 } else { 0.0 }),
            (
                Kpi::TimeToFind,
                inverse(input.time_to_find_ratio, norm.max_time_to_find_ratio),
            ),
            (
                Kpi::ReactionTime,
                inverse(input.reaction_time_secs, norm.max_reaction_time_secs),
            ),
            (
                Kpi::ResponseDuration,
                inverse(input.response_duration_secs, norm.max_response_duration_secs),
            ),
            (Kpi::TapAccuracy, inverse(input.tap_accuracy_error, norm.max_tap_error)),
        ])
    }

    pub fn score(&self, input: &RoundInput) -> KpiScore {
        let weights = self.arousal.kpi_weights(
            &self.config.kpi_weights_low,
            &self.config.kpi_weights_high,
            input.arousal,
        );
        let normalized = self.normalize(input);

        let weighted = weights.task_success * normalized[&Kpi::TaskSuccess]
            + weights.time_to_find * normalized[&Kpi::TimeToFind]
            + weights.reaction_time * normalized[&Kpi::ReactionTime]
            + weights.response_duration * normalized[&Kpi::ResponseDuration]
            + weights.tap_accuracy * normalized[&Kpi::TapAccuracy];
        let total = weights.total();
        let score = if total > 0.0 { weighted / total } else { 0.0 };

        KpiScore {
            score: score.clamp(0.0, 1.0),
            normalized,
            weights,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalDecision {
    pub thresholds: EffectiveThresholds,
    pub direction: AdaptationDirection,
    pub reversal: bool,
    pub signal: f64,
}

pub struct GlobalAdaptation {
    config: GlobalPathConfig,
    max_signal_per_round: f64,
}

impl GlobalAdaptation {
    pub fn new(config: GlobalPathConfig, max_signal_per_round: f64) -> Self {
        Self {
            config,
            max_signal_per_round,
        }
    }

    /// Picks a direction from the adaptive score and records it on `tracker`.
    pub fn decide(
        &self,
        adaptive_score: f64,
        confidence: f64,
        estimator: &ConfidenceEstimator,
        tracker: &mut DirectionTracker,
        modulation: PhaseModulation,
    ) -> GlobalDecision {
        let target = modulation.target_performance;
        let thresholds = estimator.effective_thresholds(
            confidence,
            target,
            self.config.increase_margin,
            self.config.decrease_margin,
        );

        let direction = if adaptive_score > thresholds.increase {
            AdaptationDirection::Increase
        } else if adaptive_score < thresholds.decrease {
            AdaptationDirection::Decrease
        } else {
            AdaptationDirection::Stable
        };
        let reversal = tracker.record(direction);

        let mut signal = match direction {
            AdaptationDirection::Stable => 0.0,
            _ => {
                (adaptive_score - target)
                    * confidence
                    * self.config.adaptation_rate
                    * modulation.rate_multiplier
            }
        };
        if reversal {
            signal *= self.config.reversal_damping;
        }

        GlobalDecision {
            thresholds,
            direction,
            reversal,
            signal,
        }
    }

    /// Moves every DOM through its smoothing filter, clamped per round.
    pub fn apply(
        &self,
        signal: f64,
        positions: &mut BTreeMap<DomTargetType, f64>,
    ) -> BTreeMap<DomTargetType, DomAdjustment> {
        let limit = self.max_signal_per_round;
        positions
            .iter_mut()
            .map(|(dom, position)| {
                let alpha = self.config.smoothing.get(*dom);
                let step = (alpha * signal).clamp(-limit, limit);
                let next = (*position + step).clamp(0.0, 1.0);
                let delta = next - *position;
                *position = next;
                (*dom, DomAdjustment::Global { delta })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adm::config::ArousalBand;

    fn scorer() -> KpiScorer {
        KpiScorer::new(
            GlobalPathConfig::default(),
            ArousalInterpolator::new(ArousalBand::default(), true),
        )
    }

    fn standard() -> PhaseModulation {
        PhaseModulation {
            target_performance: 0.8,
            rate_multiplier: 1.0,
        }
    }

    fn positions(value: f64) -> BTreeMap<DomTargetType, f64> {
        DomTargetType::ALL.into_iter().map(|dom| (dom, value)).collect()
    }

    #[test]
    fn test_perfect_round_scores_one() {
        let input = RoundInput {
            task_success: true,
            time_to_find_ratio: 0.0,
            reaction_time_secs: 0.0,
            response_duration_secs: 0.0,
            tap_accuracy_error: 0.0,
            ..Default::default()
        };
        assert!((scorer().score(&input).score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_slow_round_scores_zero() {
        let input = RoundInput {
            task_success: false,
            time_to_find_ratio: 3.0,
            reaction_time_secs: 5.0,
            response_duration_secs: 20.0,
            tap_accuracy_error: 90.0,
            ..Default::default()
        };
        let score = scorer().score(&input);
        assert_eq!(score.score, 0.0);
        assert!(score.normalized.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_reaction_time_normalization() {
        let input = RoundInput {
            reaction_time_secs: 1.0,
            ..Default::default()
        };
        let normalized = scorer().normalize(&input);
        assert!((normalized[&Kpi::ReactionTime] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_high_arousal_shifts_weights_to_success() {
        let s = scorer();
        let calm = s.score(&RoundInput {
            arousal: 0.2,
            ..Default::default()
        });
        let agitated = s.score(&RoundInput {
            arousal: 0.95,
            ..Default::default()
        });
        assert!(agitated.weights.task_success > calm.weights.task_success);
        assert!(agitated.weights.reaction_time < calm.weights.reaction_time);
    }

    #[test]
    fn test_named_kpis_use_wire_names() {
        let named = scorer().score(&RoundInput::default()).named();
        assert!(named.contains_key("taskSuccess"));
        assert!(named.contains_key("tapAccuracy"));
        assert_eq!(named.len(), 5);
    }

    #[test]
    fn test_decide_directions() {
        let global = GlobalAdaptation::new(GlobalPathConfig::default(), 0.15);
        let estimator = ConfidenceEstimator::default();

        let mut tracker = DirectionTracker::default();
        let up = global.decide(0.95, 1.0, &estimator, &mut tracker, standard());
        assert_eq!(up.direction, AdaptationDirection::Increase);
        assert!(up.signal > 0.0);

        let mut tracker = DirectionTracker::default();
        let hold = global.decide(0.82, 1.0, &estimator, &mut tracker, standard());
        assert_eq!(hold.direction, AdaptationDirection::Stable);
        assert_eq!(hold.signal, 0.0);

        let mut tracker = DirectionTracker::default();
        let down = global.decide(0.5, 1.0, &estimator, &mut tracker, standard());
        assert_eq!(down.direction, AdaptationDirection::Decrease);
        assert!(down.signal < 0.0);
    }

    #[test]
    fn test_low_confidence_widens_dead_zone() {
        let global = GlobalAdaptation::new(GlobalPathConfig::default(), 0.15);
        let estimator = ConfidenceEstimator::default();
        let mut tracker = DirectionTracker::default();
        // 0.88 clears 0.85 at full confidence but not 0.95 at zero confidence.
        let decision = global.decide(0.88, 0.0, &estimator, &mut tracker, standard());
        assert_eq!(decision.direction, AdaptationDirection::Stable);
    }

    #[test]
    fn test_reversal_is_damped() {
        let global = GlobalAdaptation::new(GlobalPathConfig::default(), 0.15);
        let estimator = ConfidenceEstimator::default();

        let mut fresh = DirectionTracker::default();
        let plain = global.decide(0.5, 1.0, &estimator, &mut fresh, standard());

        let mut rising = DirectionTracker::new(AdaptationDirection::Increase, 3);
        let reversed = global.decide(0.5, 1.0, &estimator, &mut rising, standard());

        assert!(reversed.reversal);
        assert!((reversed.signal - plain.signal * 0.5).abs() < 1e-12);
        assert_eq!(rising.last_direction, AdaptationDirection::Decrease);
    }

    #[test]
    fn test_apply_moves_all_doms_together_within_limit() {
        let global = GlobalAdaptation::new(GlobalPathConfig::default(), 0.15);
        let mut pos = positions(0.5);
        let adjustments = global.apply(1.0, &mut pos);

        assert_eq!(adjustments.len(), DomTargetType::ALL.len());
        for dom in DomTargetType::ALL {
            assert!((pos[&dom] - 0.65).abs() < 1e-12);
            assert!(matches!(adjustments[&dom], DomAdjustment::Global { .. }));
        }
    }

    #[test]
    fn test_apply_respects_bounds() {
        let global = GlobalAdaptation::new(GlobalPathConfig::default(), 0.15);
        let mut pos = positions(0.98);
        let adjustments = global.apply(0.2, &mut pos);
        for dom in DomTargetType::ALL {
            assert_eq!(pos[&dom], 1.0);
            assert!((adjustments[&dom].delta() - 0.02).abs() < 1e-12);
        }
    }
}
