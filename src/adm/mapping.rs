use std::collections::BTreeMap;

use crate::adm::types::DomTargetType;

/// Converts a normalized DOM position into the absolute game parameter.
///
/// Owns the per-DOM sign convention: for response time a higher normalized
/// position yields fewer seconds, for ball speed it yields more pixels/s.
pub trait DomParameterMapping: Send + Sync {
    fn to_parameter(&self, dom: DomTargetType, normalized: f64) -> f64;
}

/// Linear interpolation between an "easiest" and a "hardest" parameter value.
#[derive(Debug, Clone)]
pub struct LinearDomMapping {
    ranges: BTreeMap<DomTargetType, (f64, f64)>,
}

impl LinearDomMapping {
    pub fn new(ranges: BTreeMap<DomTargetType, (f64, f64)>) -> Self {
        Self { ranges }
    }

    pub fn range(&self, dom: DomTargetType) -> (f64, f64) {
        self.ranges.get(&dom).copied().unwrap_or((0.0, 1.0))
    }
}

impl Default for LinearDomMapping {
    fn default() -> Self {
        let ranges = BTreeMap::from([
            (DomTargetType::DiscriminatoryLoad, (0.0, 1.0)),
            (DomTargetType::MeanBallSpeed, (80.0, 320.0)),
            (DomTargetType::BallSpeedVariability, (0.0, 90.0)),
            (DomTargetType::ResponseTime, (3.0, 0.8)),
            (DomTargetType::TargetCount, (1.0, 6.0)),
        ]);
        Self { ranges }
    }
}

impl DomParameterMapping for LinearDomMapping {
    fn to_parameter(&self, dom: DomTargetType, normalized: f64) -> f64 {
        let (easy, hard) = self.range(dom);
        let value = easy + (hard - easy) * normalized.clamp(0.0, 1.0);
        if dom == DomTargetType::TargetCount {
            value.round()
        } else {
            value
        }
    }
}
