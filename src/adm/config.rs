use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adm::types::DomTargetType;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A scalar default with optional per-DOM overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerDomValue {
    pub default: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<DomTargetType, f64>,
}

impl PerDomValue {
    pub fn uniform(default: f64) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, dom: DomTargetType, value: f64) -> Self {
        self.overrides.insert(dom, value);
        self
    }

    pub fn get(&self, dom: DomTargetType) -> f64 {
        self.overrides.get(&dom).copied().unwrap_or(self.default)
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.default).chain(self.overrides.values().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyConfig {
    /// Half-life applied to the performance history ledger and confidence.
    pub history_half_life_hours: f64,
    /// Half-life applied to per-DOM profiles; short so the latest rounds dominate.
    pub profile_half_life_hours: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            history_half_life_hours: 24.0,
            profile_half_life_hours: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub window_size: usize,
    pub trend_min_entries: usize,
    /// Multiplies the score-per-minute slope before clamping to [-1, 1].
    pub trend_scale: f64,
    pub current_weight: f64,
    pub history_weight: f64,
    pub trend_weight: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            trend_min_entries: 3,
            trend_scale: 10.0,
            current_weight: 0.6,
            history_weight: 0.3,
            trend_weight: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    pub baseline_count: f64,
    pub variance_normalizer: f64,
    pub max_stable_count: u32,
    pub history_weight: f64,
    pub variance_weight: f64,
    pub direction_weight: f64,
    pub empty_history_confidence: f64,
    /// Extra threshold margin added at zero confidence.
    pub threshold_widening: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            baseline_count: 10.0,
            variance_normalizer: 0.5,
            max_stable_count: 5,
            history_weight: 0.2,
            variance_weight: 0.7,
            direction_weight: 0.1,
            empty_history_confidence: 0.5,
            threshold_widening: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArousalBand {
    pub transition_start: f64,
    pub transition_end: f64,
}

impl Default for ArousalBand {
    fn default() -> Self {
        Self {
            transition_start: 0.55,
            transition_end: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub target_performance: f64,
    pub min_data_points: usize,
    pub min_dom_variance: f64,
    pub local_variance_normalizer: f64,
    pub slope_damping: f64,
    pub min_damping_factor: f64,
    pub hardening_rate: PerDomValue,
    pub easing_rate: PerDomValue,
    pub rate_low_arousal: PerDomValue,
    pub rate_high_arousal: PerDomValue,
    pub max_signal_per_round: f64,
    pub convergence_threshold: f64,
    pub convergence_duration: u32,
    pub nudge_factor: f64,
    pub profile_capacity: usize,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            target_performance: 0.8,
            min_data_points: 7,
            min_dom_variance: 0.0005,
            local_variance_normalizer: 0.5,
            slope_damping: 0.5,
            min_damping_factor: 0.1,
            hardening_rate: PerDomValue::uniform(0.85),
            easing_rate: PerDomValue::uniform(1.0),
            rate_low_arousal: PerDomValue::uniform(1.0)
                .with_override(DomTargetType::TargetCount, 0.6),
            rate_high_arousal: PerDomValue::uniform(0.6)
                .with_override(DomTargetType::TargetCount, 0.4),
            max_signal_per_round: 0.15,
            convergence_threshold: 0.01,
            convergence_duration: 5,
            nudge_factor: 0.1,
            profile_capacity: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiWeights {
    pub task_success: f64,
    pub time_to_find: f64,
    pub reaction_time: f64,
    pub response_duration: f64,
    pub tap_accuracy: f64,
}

impl KpiWeights {
    pub fn total(&self) -> f64 {
        self.task_success
            + self.time_to_find
            + self.reaction_time
            + self.response_duration
            + self.tap_accuracy
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self {
            task_success: mix(self.task_success, other.task_success),
            time_to_find: mix(self.time_to_find, other.time_to_find),
            reaction_time: mix(self.reaction_time, other.reaction_time),
            response_duration: mix(self.response_duration, other.response_duration),
            tap_accuracy: mix(self.tap_accuracy, other.tap_accuracy),
        }
    }

    pub fn low_arousal() -> Self {
        Self {
            task_success: 0.40,
            time_to_find: 0.20,
            reaction_time: 0.15,
            response_duration: 0.10,
            tap_accuracy: 0.15,
        }
    }

    /// Under high arousal speed readings are noisy; success dominates.
    pub fn high_arousal() -> Self {
        Self {
            task_success: 0.55,
            time_to_find: 0.15,
            reaction_time: 0.05,
            response_duration: 0.05,
            tap_accuracy: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiNormalization {
    pub max_time_to_find_ratio: f64,
    pub max_reaction_time_secs: f64,
    pub max_response_duration_secs: f64,
    pub max_tap_error: f64,
}

impl Default for KpiNormalization {
    fn default() -> Self {
        Self {
            max_time_to_find_ratio: 1.0,
            max_reaction_time_secs: 2.0,
            max_response_duration_secs: 10.0,
            max_tap_error: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPathConfig {
    pub target_performance: f64,
    pub increase_margin: f64,
    pub decrease_margin: f64,
    pub adaptation_rate: f64,
    pub smoothing: PerDomValue,
    pub reversal_damping: f64,
    pub kpi_weights_low: KpiWeights,
    pub kpi_weights_high: KpiWeights,
    pub normalization: KpiNormalization,
}

impl Default for GlobalPathConfig {
    fn default() -> Self {
        Self {
            target_performance: 0.8,
            increase_margin: 0.05,
            decrease_margin: 0.05,
            adaptation_rate: 1.0,
            smoothing: PerDomValue::uniform(0.5),
            reversal_damping: 0.5,
            kpi_weights_low: KpiWeights::low_arousal(),
            kpi_weights_high: KpiWeights::high_arousal(),
            normalization: KpiNormalization::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub expected_rounds: u32,
    pub phase_proportion: f64,
    pub initial_difficulty_multiplier: f64,
    pub target_performance: f64,
    pub rate_multiplier: f64,
    pub handoff_rounds: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expected_rounds: 30,
            phase_proportion: 0.2,
            initial_difficulty_multiplier: 0.9,
            target_performance: 0.7,
            rate_multiplier: 1.5,
            handoff_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub dom_profiling_enabled: bool,
    pub arousal_interpolation_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            dom_profiling_enabled: true,
            arousal_interpolation_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmConfig {
    pub default_position: f64,
    pub recency: RecencyConfig,
    pub history: HistoryConfig,
    pub confidence: ConfidenceConfig,
    pub arousal: ArousalBand,
    pub profiling: ProfilingConfig,
    pub global: GlobalPathConfig,
    pub warmup: WarmupConfig,
    pub feature_flags: FeatureFlags,
}

impl Default for AdmConfig {
    fn default() -> Self {
        Self {
            default_position: 0.5,
            recency: RecencyConfig::default(),
            history: HistoryConfig::default(),
            confidence: ConfidenceConfig::default(),
            arousal: ArousalBand::default(),
            profiling: ProfilingConfig::default(),
            global: GlobalPathConfig::default(),
            warmup: WarmupConfig::default(),
            feature_flags: FeatureFlags::default(),
        }
    }
}

const WEIGHT_SUM_TOLERANCE: f64 = 0.05;

impl AdmConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ADM_PROFILING_ENABLED") {
            config.feature_flags.dom_profiling_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("ADM_AROUSAL_INTERPOLATION_ENABLED") {
            config.feature_flags.arousal_interpolation_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("ADM_WARMUP_ENABLED") {
            config.warmup.enabled = val.parse().unwrap_or(true);
        }
        if let Some(rounds) = env_parse::<u32>("ADM_EXPECTED_ROUNDS") {
            config.warmup.expected_rounds = rounds;
        }
        if let Some(target) = env_parse::<f64>("ADM_TARGET_PERFORMANCE") {
            config.profiling.target_performance = target;
            config.global.target_performance = target;
        }
        if let Some(limit) = env_parse::<f64>("ADM_MAX_SIGNAL_PER_ROUND") {
            config.profiling.max_signal_per_round = limit;
        }

        config
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("default_position", self.default_position)?;

        if !(self.recency.history_half_life_hours > 0.0) {
            return invalid("recency.history_half_life_hours must be positive");
        }
        if !(self.recency.profile_half_life_hours > 0.0) {
            return invalid("recency.profile_half_life_hours must be positive");
        }

        if self.history.window_size == 0 {
            return invalid("history.window_size must be at least 1");
        }
        check_weight_sum(
            "history weights",
            self.history.current_weight + self.history.history_weight + self.history.trend_weight,
        )?;

        let conf = &self.confidence;
        if !(conf.baseline_count > 0.0) || !(conf.variance_normalizer > 0.0) {
            return invalid("confidence baseline and normalizer must be positive");
        }
        if conf.max_stable_count == 0 {
            return invalid("confidence.max_stable_count must be at least 1");
        }
        check_weight_sum(
            "confidence weights",
            conf.history_weight + conf.variance_weight + conf.direction_weight,
        )?;
        check_unit("confidence.empty_history_confidence", conf.empty_history_confidence)?;

        if !(self.arousal.transition_start < self.arousal.transition_end) {
            return invalid("arousal band start must be below its end");
        }

        let prof = &self.profiling;
        check_unit("profiling.target_performance", prof.target_performance)?;
        if prof.min_data_points < 2 {
            return invalid("profiling.min_data_points must be at least 2");
        }
        if !(prof.max_signal_per_round > 0.0) {
            return invalid("profiling.max_signal_per_round must be positive");
        }
        if !(prof.local_variance_normalizer > 0.0) {
            return invalid("profiling.local_variance_normalizer must be positive");
        }
        if !(prof.nudge_factor >= 0.0) || !(prof.convergence_threshold >= 0.0) {
            return invalid("profiling nudge factor and convergence threshold must be non-negative");
        }
        if prof.convergence_duration == 0 {
            return invalid("profiling.convergence_duration must be at least 1");
        }
        if prof.profile_capacity < prof.min_data_points {
            return invalid("profiling.profile_capacity must hold at least min_data_points");
        }
        for table in [
            &prof.hardening_rate,
            &prof.easing_rate,
            &prof.rate_low_arousal,
            &prof.rate_high_arousal,
        ] {
            if table.values().any(|v| !(v >= 0.0)) {
                return invalid("profiling rate tables must be non-negative");
            }
        }

        let global = &self.global;
        check_unit("global.target_performance", global.target_performance)?;
        check_weight_sum("global.kpi_weights_low", global.kpi_weights_low.total())?;
        check_weight_sum("global.kpi_weights_high", global.kpi_weights_high.total())?;
        check_unit("global.reversal_damping", global.reversal_damping)?;
        if global.smoothing.values().any(|v| !(0.0..=1.0).contains(&v)) {
            return invalid("global.smoothing values must lie in [0, 1]");
        }

        let warmup = &self.warmup;
        check_unit("warmup.phase_proportion", warmup.phase_proportion)?;
        check_unit("warmup.target_performance", warmup.target_performance)?;
        if !(warmup.initial_difficulty_multiplier > 0.0) || !(warmup.rate_multiplier > 0.0) {
            return invalid("warmup multipliers must be positive");
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}

fn invalid(message: &str) -> ConfigResult<()> {
    Err(ConfigError::Invalid(message.to_string()))
}

fn check_unit(name: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must lie in [0, 1], got {value}")))
    }
}

fn check_weight_sum(name: &str, sum: f64) -> ConfigResult<()> {
    if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} must sum to 1, got {sum:.3}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AdmConfig::default().validate().is_ok());
    }

    #[test]
    fn test_per_dom_override_falls_back_to_default() {
        let table = PerDomValue::uniform(0.85).with_override(DomTargetType::ResponseTime, 0.5);
        assert_eq!(table.get(DomTargetType::ResponseTime), 0.5);
        assert_eq!(table.get(DomTargetType::MeanBallSpeed), 0.85);
    }

    #[test]
    fn test_rejects_unbalanced_confidence_weights() {
        let mut config = AdmConfig::default();
        config.confidence.variance_weight = 0.9;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_arousal_band() {
        let mut config = AdmConfig::default();
        config.arousal = ArousalBand {
            transition_start: 0.8,
            transition_end: 0.4,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kpi_weight_lerp_endpoints() {
        let low = KpiWeights::low_arousal();
        let high = KpiWeights::high_arousal();
        assert_eq!(low.lerp(&high, 0.0), low);
        let end = low.lerp(&high, 1.0);
        assert!((end.task_success - high.task_success).abs() < 1e-12);
        assert!((end.tap_accuracy - high.tap_accuracy).abs() < 1e-12);
    }
}
