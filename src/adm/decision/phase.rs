use crate::adm::config::WarmupConfig;
use crate::adm::types::SessionPhase;

/// Target and rate scaling in force for the current round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseModulation {
    pub target_performance: f64,
    pub rate_multiplier: f64,
}

/// Tracks warm-up, hand-off and standard phases within one session.
///
/// Warm-up runs a lower target with a faster rate; the hand-off rounds blend
/// linearly back to the standard values so the controller never jumps.
pub struct SessionPhaseManager {
    config: WarmupConfig,
    warmup_rounds: u32,
    completed_rounds: u32,
}

impl SessionPhaseManager {
    pub fn new(config: WarmupConfig) -> Self {
        let warmup_rounds = Self::warmup_length(&config);
        Self {
            config,
            warmup_rounds,
            completed_rounds: 0,
        }
    }

    /// round(expected × proportion), at least one round whenever warm-up applies.
    pub fn warmup_length(config: &WarmupConfig) -> u32 {
        if !config.enabled || config.expected_rounds == 0 {
            return 0;
        }
        let rounds = (config.expected_rounds as f64 * config.phase_proportion).round();
        (rounds as u32).max(1)
    }

    pub fn is_active(&self) -> bool {
        self.warmup_rounds > 0
    }

    pub fn warmup_rounds(&self) -> u32 {
        self.warmup_rounds
    }

    pub fn completed_rounds(&self) -> u32 {
        self.completed_rounds
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.is_active() {
            return SessionPhase::Standard;
        }
        if self.completed_rounds < self.warmup_rounds {
            SessionPhase::Warmup
        } else if self.completed_rounds < self.warmup_rounds + self.config.handoff_rounds {
            SessionPhase::Handoff
        } else {
            SessionPhase::Standard
        }
    }

    /// Applied once to positions at session start.
    pub fn initial_position(&self, position: f64) -> f64 {
        if self.is_active() {
            (position * self.config.initial_difficulty_multiplier).clamp(0.0, 1.0)
        } else {
            position
        }
    }

    pub fn modulation(&self, standard_target: f64) -> PhaseModulation {
        let warmup = PhaseModulation {
            target_performance: self.config.target_performance,
            rate_multiplier: self.config.rate_multiplier,
        };
        let standard = PhaseModulation {
            target_performance: standard_target,
            rate_multiplier: 1.0,
        };

        match self.phase() {
            SessionPhase::Warmup => warmup,
            SessionPhase::Standard => standard,
            SessionPhase::Handoff => {
                let step = self.completed_rounds - self.warmup_rounds + 1;
                let t = step as f64 / (self.config.handoff_rounds + 1) as f64;
                PhaseModulation {
                    target_performance: warmup.target_performance
                        + (standard.target_performance - warmup.target_performance) * t,
                    rate_multiplier: warmup.rate_multiplier
                        + (standard.rate_multiplier - warmup.rate_multiplier) * t,
                }
            }
        }
    }

    pub fn complete_round(&mut self) {
        let before = self.phase();
        self.completed_rounds = self.completed_rounds.saturating_add(1);
        let after = self.phase();
        if before != after {
            tracing::info!(
                from = ?before,
                to = ?after,
                round = self.completed_rounds,
                "session phase changed"
            );
        }
    }
}
