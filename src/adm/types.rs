//! Shared ADM types and the persisted state shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adm::modeling::profile::DomPerformanceProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomTargetType {
    DiscriminatoryLoad,
    MeanBallSpeed,
    BallSpeedVariability,
    ResponseTime,
    TargetCount,
}

impl DomTargetType {
    pub const ALL: [DomTargetType; 5] = [
        Self::DiscriminatoryLoad,
        Self::MeanBallSpeed,
        Self::BallSpeedVariability,
        Self::ResponseTime,
        Self::TargetCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscriminatoryLoad => "discriminatoryLoad",
            Self::MeanBallSpeed => "meanBallSpeed",
            Self::BallSpeedVariability => "ballSpeedVariability",
            Self::ResponseTime => "responseTime",
            Self::TargetCount => "targetCount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dom| dom.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptationDirection {
    Increase,
    Decrease,
    #[default]
    Stable,
}

impl AdaptationDirection {
    pub fn from_signal(signal: f64) -> Self {
        if signal > 0.0 {
            Self::Increase
        } else if signal < 0.0 {
            Self::Decrease
        } else {
            Self::Stable
        }
    }

    pub fn is_reversal_of(&self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Increase, Self::Decrease) | (Self::Decrease, Self::Increase)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kpi {
    TaskSuccess,
    TimeToFind,
    ReactionTime,
    ResponseDuration,
    TapAccuracy,
}

impl Kpi {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskSuccess => "taskSuccess",
            Self::TimeToFind => "timeToFind",
            Self::ReactionTime => "reactionTime",
            Self::ResponseDuration => "responseDuration",
            Self::TapAccuracy => "tapAccuracy",
        }
    }
}

/// Raw per-round measurements reported by the game layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundInput {
    pub task_success: bool,
    /// Time to find the targets relative to the allotted time; lower is better.
    pub time_to_find_ratio: f64,
    pub reaction_time_secs: f64,
    pub response_duration_secs: f64,
    pub tap_accuracy_error: f64,
    pub target_count: u32,
    pub arousal: f64,
    /// Optional 0-100 stress reading; when present it supersedes `arousal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<String>,
}

impl Default for RoundInput {
    fn default() -> Self {
        Self {
            task_success: true,
            time_to_find_ratio: 0.5,
            reaction_time_secs: 0.8,
            response_duration_secs: 3.0,
            tap_accuracy_error: 10.0,
            target_count: 3,
            arousal: 0.5,
            stress_level: None,
            session_context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceHistoryEntry {
    pub timestamp: i64,
    pub overall_performance: f64,
    #[serde(default)]
    pub kpis: BTreeMap<String, f64>,
    #[serde(default)]
    pub arousal_level: f64,
    #[serde(default)]
    pub dom_values: BTreeMap<DomTargetType, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<String>,
}

impl PerformanceHistoryEntry {
    pub fn new(timestamp: i64, overall_performance: f64) -> Self {
        Self {
            timestamp,
            overall_performance,
            kpis: BTreeMap::new(),
            arousal_level: 0.0,
            dom_values: BTreeMap::new(),
            session_context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceComponents {
    pub history: f64,
    pub variance: f64,
    pub direction: f64,
    pub total: f64,
}

/// Per-DOM convergence tracking. A pending nudge replaces the next PD update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConvergenceState {
    #[serde(rename_all = "camelCase")]
    Active { near_target_rounds: u32 },
    PendingNudge,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self::Active {
            near_target_rounds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Warmup,
    Handoff,
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdaptationPath {
    DomProfiling,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DomAdjustment {
    NoSignal,
    Pd { signal: f64, delta: f64 },
    Nudge { delta: f64 },
    Global { delta: f64 },
}

impl DomAdjustment {
    /// Position change actually applied, after the [0, 1] clamp.
    pub fn delta(&self) -> f64 {
        match self {
            Self::NoSignal => 0.0,
            Self::Pd { delta, .. } | Self::Nudge { delta } | Self::Global { delta } => *delta,
        }
    }

    pub fn is_nudge(&self) -> bool {
        matches!(self, Self::Nudge { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    pub round_index: u32,
    pub phase: SessionPhase,
    pub path: AdaptationPath,
    pub performance_score: f64,
    pub adaptive_score: f64,
    pub confidence: ConfidenceComponents,
    pub direction: AdaptationDirection,
    pub adjustments: BTreeMap<DomTargetType, DomAdjustment>,
    pub positions: BTreeMap<DomTargetType, f64>,
}

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAdmState {
    pub version: u32,
    #[serde(default)]
    pub performance_history: Vec<PerformanceHistoryEntry>,
    #[serde(default)]
    pub last_adaptation_direction: AdaptationDirection,
    #[serde(default)]
    pub direction_stable_count: u32,
    #[serde(default)]
    pub normalized_positions: BTreeMap<DomTargetType, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_performance_profiles: Option<BTreeMap<DomTargetType, DomPerformanceProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_convergence: Option<BTreeMap<DomTargetType, ConvergenceState>>,
    /// Top-level fields written by a newer schema, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PersistedAdmState {
    pub fn empty_profiles() -> BTreeMap<DomTargetType, DomPerformanceProfile> {
        DomTargetType::ALL
            .into_iter()
            .map(|dom| (dom, DomPerformanceProfile::default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_names_round_trip() {
        for dom in DomTargetType::ALL {
            assert_eq!(DomTargetType::parse(dom.as_str()), Some(dom));
        }
        assert_eq!(DomTargetType::parse("unknown"), None);
    }

    #[test]
    fn test_dom_serializes_as_map_key() {
        let mut positions = BTreeMap::new();
        positions.insert(DomTargetType::ResponseTime, 0.4);
        let json = serde_json::to_string(&positions).unwrap();
        assert_eq!(json, r#"{"responseTime":0.4}"#);
    }

    #[test]
    fn test_direction_from_signal() {
        assert_eq!(AdaptationDirection::from_signal(0.2), AdaptationDirection::Increase);
        assert_eq!(AdaptationDirection::from_signal(-0.2), AdaptationDirection::Decrease);
        assert_eq!(AdaptationDirection::from_signal(0.0), AdaptationDirection::Stable);
        assert!(AdaptationDirection::Increase.is_reversal_of(AdaptationDirection::Decrease));
        assert!(!AdaptationDirection::Stable.is_reversal_of(AdaptationDirection::Decrease));
    }

    #[test]
    fn test_convergence_state_json_shape() {
        let json = serde_json::to_value(ConvergenceState::Active {
            near_target_rounds: 3,
        })
        .unwrap();
        assert_eq!(json["state"], "active");
        assert_eq!(json["nearTargetRounds"], 3);
    }
}
