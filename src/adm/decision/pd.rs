//! Per-DOM PD controller.
//!
//! Each DOM moves on its own profile: the proportional term is the gap
//! between recency-weighted performance and the target, the slope of
//! performance against the DOM value damps it, local confidence scales it,
//! and the result is clamped to the per-round limit. Convergence is tracked
//! per DOM; once a DOM has sat near target long enough the next round applies
//! a fixed exploration nudge instead of a PD update.

use crate::adm::config::ProfilingConfig;
use crate::adm::decision::phase::PhaseModulation;
use crate::adm::modeling::arousal::ArousalInterpolator;
use crate::adm::modeling::profile::{DomPerformanceProfile, ProfileSnapshot};
use crate::adm::modeling::recency::RecencyWeighting;
use crate::adm::types::{ConvergenceState, DomAdjustment, DomTargetType};

/// Breakdown of one PD computation, kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdSignal {
    pub performance_gap: f64,
    pub slope: f64,
    pub damping: f64,
    pub local_confidence: f64,
    pub direction_rate: f64,
    pub adaptation_rate: f64,
    pub unclamped: f64,
    pub signal: f64,
}

/// Inputs shared by every DOM within one modulation pass.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext {
    pub arousal: f64,
    pub modulation: PhaseModulation,
    pub now_ms: i64,
}

pub struct DomPdController {
    config: ProfilingConfig,
    weighting: RecencyWeighting,
    arousal: ArousalInterpolator,
}

impl DomPdController {
    pub fn new(
        config: ProfilingConfig,
        weighting: RecencyWeighting,
        arousal: ArousalInterpolator,
    ) -> Self {
        Self {
            config,
            weighting,
            arousal,
        }
    }

    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }

    /// Confidence from this DOM's profile alone: variance × data-count.
    pub fn local_confidence(&self, snapshot: &ProfileSnapshot) -> f64 {
        if snapshot.count == 0 {
            return 0.0;
        }
        let spread = snapshot.performance_std_dev() / self.config.local_variance_normalizer;
        let variance_component = (1.0 - spread.min(1.0)).max(0.0);
        let data_component =
            (snapshot.count as f64 / self.config.min_data_points as f64).min(1.0);
        variance_component * data_component
    }

    /// Hardening rate for a positive gap; easing rate otherwise, including a zero gap.
    pub fn direction_rate(&self, dom: DomTargetType, performance_gap: f64) -> f64 {
        if performance_gap > 0.0 {
            self.config.hardening_rate.get(dom)
        } else {
            self.config.easing_rate.get(dom)
        }
    }

    pub fn adaptation_rate(&self, dom: DomTargetType, arousal: f64) -> f64 {
        self.arousal.rate(
            dom,
            &self.config.rate_low_arousal,
            &self.config.rate_high_arousal,
            arousal,
        )
    }

    /// Steeper slopes damp harder; never drops below the floor so the sign holds.
    pub fn damping(&self, slope: f64) -> f64 {
        (1.0 - self.config.slope_damping * slope.abs()).max(self.config.min_damping_factor.max(0.0))
    }

    /// Returns `None` when the profile is too small or its DOM values have no spread.
    pub fn compute_signal(
        &self,
        dom: DomTargetType,
        profile: &DomPerformanceProfile,
        ctx: RoundContext,
    ) -> Option<PdSignal> {
        if profile.len() < self.config.min_data_points {
            return None;
        }

        let snapshot = profile.snapshot(&self.weighting, ctx.now_ms);
        if snapshot.dom_variance() < self.config.min_dom_variance {
            return None;
        }

        let performance_gap = snapshot.mean_performance() - ctx.modulation.target_performance;
        let slope = snapshot.slope();
        let damping = self.damping(slope);
        let local_confidence = self.local_confidence(&snapshot);
        let direction_rate = self.direction_rate(dom, performance_gap);
        let adaptation_rate =
            self.adaptation_rate(dom, ctx.arousal) * ctx.modulation.rate_multiplier;

        let unclamped =
            performance_gap * damping * local_confidence * direction_rate * adaptation_rate;
        let limit = self.config.max_signal_per_round;
        let signal = unclamped.clamp(-limit, limit);

        Some(PdSignal {
            performance_gap,
            slope,
            damping,
            local_confidence,
            direction_rate,
            adaptation_rate,
            unclamped,
            signal,
        })
    }

    /// Signed nudge pushing the position away from the 0.5 midpoint.
    pub fn nudge_delta(&self, position: f64) -> f64 {
        let magnitude = self.config.nudge_factor.min(self.config.max_signal_per_round);
        if position > 0.5 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Advances one DOM by one round and returns the adjustment and new position.
    pub fn step(
        &self,
        dom: DomTargetType,
        position: f64,
        profile: &DomPerformanceProfile,
        state: &mut ConvergenceState,
        ctx: RoundContext,
    ) -> (DomAdjustment, f64) {
        if let ConvergenceState::PendingNudge = *state {
            let new_position = (position + self.nudge_delta(position)).clamp(0.0, 1.0);
            *state = ConvergenceState::default();
            tracing::debug!(dom = dom.as_str(), position, new_position, "exploration nudge");
            return (
                DomAdjustment::Nudge {
                    delta: new_position - position,
                },
                new_position,
            );
        }

        // A failed guard counts as a zero signal toward convergence.
        let Some(pd) = self.compute_signal(dom, profile, ctx) else {
            *state = self.advance_convergence(*state, 0.0);
            return (DomAdjustment::NoSignal, position);
        };

        *state = self.advance_convergence(*state, pd.signal);

        let new_position = (position + pd.signal).clamp(0.0, 1.0);
        tracing::debug!(
            dom = dom.as_str(),
            gap = pd.performance_gap,
            slope = pd.slope,
            confidence = pd.local_confidence,
            signal = pd.signal,
            "pd signal"
        );
        (
            DomAdjustment::Pd {
                signal: pd.signal,
                delta: new_position - position,
            },
            new_position,
        )
    }

    fn advance_convergence(&self, state: ConvergenceState, signal: f64) -> ConvergenceState {
        let near_target_rounds = match state {
            ConvergenceState::Active { near_target_rounds } => near_target_rounds,
            ConvergenceState::PendingNudge => 0,
        };

        if signal.abs() > self.config.convergence_threshold {
            return ConvergenceState::default();
        }

        let near_target_rounds = near_target_rounds.saturating_add(1);
        if near_target_rounds >= self.config.convergence_duration {
            ConvergenceState::PendingNudge
        } else {
            ConvergenceState::Active { near_target_rounds }
        }
    }
}
