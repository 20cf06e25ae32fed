//! Arousal-driven interpolation of rates and KPI weights.

use crate::adm::config::{ArousalBand, KpiWeights, PerDomValue};
use crate::adm::types::DomTargetType;

pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

impl ArousalBand {
    /// 0 below the band, 1 above it, smoothstep-eased in between.
    pub fn blend_factor(&self, arousal: f64) -> f64 {
        let span = self.transition_end - self.transition_start;
        if span <= 0.0 {
            return if arousal >= self.transition_end { 1.0 } else { 0.0 };
        }
        smoothstep((arousal - self.transition_start) / span)
    }
}

/// Interpolates low/mid- and high-arousal tables by the current arousal level.
#[derive(Debug, Clone, Copy)]
pub struct ArousalInterpolator {
    band: ArousalBand,
    enabled: bool,
}

impl ArousalInterpolator {
    pub fn new(band: ArousalBand, enabled: bool) -> Self {
        Self { band, enabled }
    }

    pub fn factor(&self, arousal: f64) -> f64 {
        if self.enabled {
            self.band.blend_factor(arousal)
        } else {
            0.0
        }
    }

    pub fn rate(
        &self,
        dom: DomTargetType,
        low: &PerDomValue,
        high: &PerDomValue,
        arousal: f64,
    ) -> f64 {
        let t = self.factor(arousal);
        let low = low.get(dom);
        low + (high.get(dom) - low) * t
    }

    pub fn kpi_weights(&self, low: &KpiWeights, high: &KpiWeights, arousal: f64) -> KpiWeights {
        low.lerp(high, self.factor(arousal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_endpoints_and_midpoint() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(3.0), 1.0);
    }

    #[test]
    fn test_band_is_flat_outside() {
        let band = ArousalBand::default();
        assert_eq!(band.blend_factor(0.1), 0.0);
        assert_eq!(band.blend_factor(0.95), 1.0);
        let mid = band.blend_factor((band.transition_start + band.transition_end) / 2.0);
        assert!((mid - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rate_interpolation_and_pinning() {
        let low = PerDomValue::uniform(1.0);
        let high = PerDomValue::uniform(0.5);
        let dom = DomTargetType::MeanBallSpeed;

        let enabled = ArousalInterpolator::new(ArousalBand::default(), true);
        assert_eq!(enabled.rate(dom, &low, &high, 1.0), 0.5);
        assert_eq!(enabled.rate(dom, &low, &high, 0.0), 1.0);

        let pinned = ArousalInterpolator::new(ArousalBand::default(), false);
        assert_eq!(pinned.rate(dom, &low, &high, 1.0), 1.0);
    }

    #[test]
    fn test_kpi_weights_follow_arousal() {
        let interp = ArousalInterpolator::new(ArousalBand::default(), true);
        let low = KpiWeights::low_arousal();
        let high = KpiWeights::high_arousal();
        let calm = interp.kpi_weights(&low, &high, 0.2);
        let agitated = interp.kpi_weights(&low, &high, 0.9);
        assert_eq!(calm, low);
        assert!((agitated.task_success - high.task_success).abs() < 1e-12);
        assert!((agitated.reaction_time - high.reaction_time).abs() < 1e-12);
        assert!((agitated.total() - 1.0).abs() < 1e-9);
    }
}
