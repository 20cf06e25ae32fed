pub mod arousal;
pub mod confidence;
pub mod history;
pub mod profile;
pub mod recency;

pub use arousal::{smoothstep, ArousalInterpolator};
pub use confidence::{ConfidenceEstimator, DirectionTracker, EffectiveThresholds};
pub use history::{HistoryMetrics, PerformanceHistory};
pub use profile::{DomPerformanceProfile, DomProfileSample, ProfileSnapshot};
pub use recency::{
    standard_deviation, weighted_mean, weighted_slope, weighted_std_dev, weighted_variance,
    RecencyWeighting,
};
