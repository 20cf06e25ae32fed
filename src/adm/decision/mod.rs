pub mod global;
pub mod pd;
pub mod phase;

pub use global::{GlobalAdaptation, GlobalDecision, KpiScore, KpiScorer};
pub use pd::{DomPdController, PdSignal, RoundContext};
pub use phase::{PhaseModulation, SessionPhaseManager};
