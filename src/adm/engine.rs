use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::adm::clock::{Clock, SystemClock};
use crate::adm::config::{AdmConfig, ConfigResult};
use crate::adm::decision::{
    DomPdController, GlobalAdaptation, KpiScorer, PhaseModulation, RoundContext,
    SessionPhaseManager,
};
use crate::adm::mapping::{DomParameterMapping, LinearDomMapping};
use crate::adm::modeling::{
    ArousalInterpolator, ConfidenceEstimator, DirectionTracker, DomPerformanceProfile,
    PerformanceHistory, RecencyWeighting,
};
use crate::adm::persistence::{DeferredWriter, PersistenceResult, StateStore};
use crate::adm::sanitize::{clamp_unit, sanitize_round_input};
use crate::adm::types::{
    AdaptationDirection, AdaptationPath, ConfidenceComponents, ConvergenceState, DomAdjustment,
    DomTargetType, PerformanceHistoryEntry, PersistedAdmState, RoundInput, RoundOutcome,
    SessionPhase, CURRENT_SCHEMA_VERSION,
};

/// Collaborators handed to the engine at construction.
#[derive(Clone)]
pub struct EngineServices {
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
    pub mapping: Arc<dyn DomParameterMapping>,
}

impl EngineServices {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            mapping: Arc::new(LinearDomMapping::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mapping(mut self, mapping: Arc<dyn DomParameterMapping>) -> Self {
        self.mapping = mapping;
        self
    }
}

/// Adaptive difficulty for one user's session.
///
/// Owns the normalized DOM positions and all evidence behind them. Each round
/// either runs the per-DOM PD path or the global path, depending on
/// `feature_flags.dom_profiling_enabled`.
pub struct AdmEngine {
    config: AdmConfig,
    user_id: String,
    services: EngineServices,

    positions: BTreeMap<DomTargetType, f64>,
    /// Amount warm-up scaling took off each position; added back on save.
    warmup_offsets: BTreeMap<DomTargetType, f64>,
    history: PerformanceHistory,
    profiles: BTreeMap<DomTargetType, DomPerformanceProfile>,
    convergence: BTreeMap<DomTargetType, ConvergenceState>,
    direction: DirectionTracker,
    phases: SessionPhaseManager,

    estimator: ConfidenceEstimator,
    pd: DomPdController,
    global: GlobalAdaptation,
    scorer: KpiScorer,

    schema_version: u32,
    carried_fields: serde_json::Map<String, serde_json::Value>,
    round_index: u32,
}

impl AdmEngine {
    pub fn new(
        config: AdmConfig,
        user_id: impl Into<String>,
        services: EngineServices,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let user_id = user_id.into();

        let history_weighting = RecencyWeighting::new(config.recency.history_half_life_hours);
        let profile_weighting = RecencyWeighting::new(config.recency.profile_half_life_hours);
        let arousal = ArousalInterpolator::new(
            config.arousal,
            config.feature_flags.arousal_interpolation_enabled,
        );

        let mut engine = Self {
            history: PerformanceHistory::new(config.history.clone(), history_weighting),
            positions: DomTargetType::ALL
                .into_iter()
                .map(|dom| (dom, config.default_position))
                .collect(),
            warmup_offsets: BTreeMap::new(),
            profiles: BTreeMap::new(),
            convergence: BTreeMap::new(),
            direction: DirectionTracker::default(),
            phases: SessionPhaseManager::new(config.warmup.clone()),
            estimator: ConfidenceEstimator::new(config.confidence.clone()),
            pd: DomPdController::new(config.profiling.clone(), profile_weighting, arousal),
            global: GlobalAdaptation::new(
                config.global.clone(),
                config.profiling.max_signal_per_round,
            ),
            scorer: KpiScorer::new(config.global.clone(), arousal),
            schema_version: CURRENT_SCHEMA_VERSION,
            carried_fields: serde_json::Map::new(),
            round_index: 0,
            config,
            user_id,
            services,
        };

        let loaded = engine.services.store.load(&engine.user_id);
        let restored = loaded.is_some();
        if let Some(state) = loaded {
            engine.restore(state);
        }
        engine.fill_missing_profiles();

        // In-memory only; snapshots add the offsets back.
        if engine.phases.is_active() {
            for (dom, position) in engine.positions.iter_mut() {
                let scaled = engine.phases.initial_position(*position);
                engine.warmup_offsets.insert(*dom, *position - scaled);
                *position = scaled;
            }
        }

        tracing::info!(
            user_id = %engine.user_id,
            restored,
            warmup_rounds = engine.phases.warmup_rounds(),
            profiling = engine.config.feature_flags.dom_profiling_enabled,
            "adm engine ready"
        );
        Ok(engine)
    }

    fn restore(&mut self, state: PersistedAdmState) {
        self.history = PerformanceHistory::from_entries(
            self.config.history.clone(),
            self.history.weighting(),
            state.performance_history,
        );
        self.direction =
            DirectionTracker::new(state.last_adaptation_direction, state.direction_stable_count);

        let default_position = self.config.default_position;
        for (dom, value) in state.normalized_positions {
            self.positions.insert(dom, clamp_unit(value, default_position));
        }

        if let Some(profiles) = state.dom_performance_profiles {
            self.profiles = profiles;
        }
        if let Some(convergence) = state.dom_convergence {
            self.convergence = convergence;
        }

        self.schema_version = state.version;
        self.carried_fields = state.extra;
    }

    fn fill_missing_profiles(&mut self) {
        let capacity = self.config.profiling.profile_capacity;
        for dom in DomTargetType::ALL {
            self.profiles
                .entry(dom)
                .or_insert_with(|| DomPerformanceProfile::with_capacity(capacity))
                .set_capacity(capacity);
            self.convergence.entry(dom).or_default();
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &AdmConfig {
        &self.config
    }

    pub fn position(&self, dom: DomTargetType) -> f64 {
        self.positions
            .get(&dom)
            .copied()
            .unwrap_or(self.config.default_position)
    }

    pub fn positions(&self) -> &BTreeMap<DomTargetType, f64> {
        &self.positions
    }

    /// Absolute injection; the value is also what gets persisted.
    pub fn set_position(&mut self, dom: DomTargetType, value: f64) {
        let value = clamp_unit(value, self.position(dom));
        self.positions.insert(dom, value);
        self.warmup_offsets.remove(&dom);
    }

    /// Absolute game value for `dom` through the injected mapping.
    pub fn game_parameter(&self, dom: DomTargetType) -> f64 {
        self.services.mapping.to_parameter(dom, self.position(dom))
    }

    pub fn game_parameters(&self) -> BTreeMap<DomTargetType, f64> {
        DomTargetType::ALL
            .into_iter()
            .map(|dom| (dom, self.game_parameter(dom)))
            .collect()
    }

    pub fn history(&self) -> &PerformanceHistory {
        &self.history
    }

    pub fn profile(&self, dom: DomTargetType) -> Option<&DomPerformanceProfile> {
        self.profiles.get(&dom)
    }

    pub fn convergence_state(&self, dom: DomTargetType) -> ConvergenceState {
        self.convergence.get(&dom).copied().unwrap_or_default()
    }

    pub fn direction(&self) -> DirectionTracker {
        self.direction
    }

    pub fn phase(&self) -> SessionPhase {
        self.phases.phase()
    }

    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    pub fn confidence(&self) -> ConfidenceComponents {
        self.estimator
            .components(&self.history, &self.direction, self.services.clock.now_ms())
    }

    /// Appends one sample to a DOM's profile. Non-finite samples are dropped.
    pub fn record_dom_performance(
        &mut self,
        dom: DomTargetType,
        dom_value: f64,
        performance: f64,
        timestamp_ms: i64,
    ) {
        if !dom_value.is_finite() || !performance.is_finite() {
            tracing::warn!(dom = dom.as_str(), dom_value, performance, "dropping non-finite sample");
            return;
        }
        let capacity = self.config.profiling.profile_capacity;
        self.profiles
            .entry(dom)
            .or_insert_with(|| DomPerformanceProfile::with_capacity(capacity))
            .record_performance(
                dom_value.clamp(0.0, 1.0),
                performance.clamp(0.0, 1.0),
                timestamp_ms,
            );
    }

    /// One PD pass over every DOM using the profiles as they stand.
    pub fn modulate_doms_with_profiling(
        &mut self,
        arousal: f64,
    ) -> BTreeMap<DomTargetType, DomAdjustment> {
        let ctx = RoundContext {
            arousal: clamp_unit(arousal, 0.5),
            modulation: self.profiling_modulation(),
            now_ms: self.services.clock.now_ms(),
        };
        self.run_profiling(ctx).0
    }

    fn profiling_modulation(&self) -> PhaseModulation {
        self.phases
            .modulation(self.config.profiling.target_performance)
    }

    fn run_profiling(
        &mut self,
        ctx: RoundContext,
    ) -> (BTreeMap<DomTargetType, DomAdjustment>, AdaptationDirection) {
        let mut adjustments = BTreeMap::new();
        let mut signals = Vec::new();

        for dom in DomTargetType::ALL {
            let position = self.position(dom);
            let Some(profile) = self.profiles.get(&dom) else {
                adjustments.insert(dom, DomAdjustment::NoSignal);
                continue;
            };
            let state = self.convergence.entry(dom).or_default();
            let (adjustment, next) = self.pd.step(dom, position, profile, state, ctx);

            match adjustment {
                DomAdjustment::Pd { signal, .. } => signals.push(signal),
                DomAdjustment::Nudge { delta } => signals.push(delta),
                _ => {}
            }
            self.positions.insert(dom, next);
            adjustments.insert(dom, adjustment);
        }

        let direction = if signals.is_empty() {
            AdaptationDirection::Stable
        } else {
            AdaptationDirection::from_signal(signals.iter().sum::<f64>() / signals.len() as f64)
        };
        self.direction.record(direction);

        (adjustments, direction)
    }

    /// Scores a finished round and adapts the DOM positions for the next one.
    pub fn record_round(&mut self, input: &RoundInput) -> RoundOutcome {
        let input = sanitize_round_input(input);
        let now_ms = self.services.clock.now_ms();
        let phase = self.phases.phase();

        let kpi = self.scorer.score(&input);
        let adaptive_score = self.history.adaptive_score(kpi.score, now_ms);

        let played_at = self.positions.clone();
        let mut entry = PerformanceHistoryEntry::new(now_ms, kpi.score);
        entry.kpis = kpi.named();
        entry.arousal_level = input.arousal;
        entry.dom_values = played_at.clone();
        entry.session_context = input.session_context.clone();
        self.history.add_entry(entry);

        let (path, adjustments, direction) = if self.config.feature_flags.dom_profiling_enabled {
            for (dom, value) in &played_at {
                self.record_dom_performance(*dom, *value, kpi.score, now_ms);
            }
            let ctx = RoundContext {
                arousal: input.arousal,
                modulation: self.profiling_modulation(),
                now_ms,
            };
            let (adjustments, direction) = self.run_profiling(ctx);
            (AdaptationPath::DomProfiling, adjustments, direction)
        } else {
            let modulation = self.phases.modulation(self.config.global.target_performance);
            let confidence = self.estimator.confidence(&self.history, &self.direction, now_ms);
            let decision = self.global.decide(
                adaptive_score,
                confidence,
                &self.estimator,
                &mut self.direction,
                modulation,
            );
            let adjustments = self.global.apply(decision.signal, &mut self.positions);
            (AdaptationPath::Global, adjustments, decision.direction)
        };

        let confidence = self
            .estimator
            .components(&self.history, &self.direction, now_ms);

        let outcome = RoundOutcome {
            round_index: self.round_index,
            phase,
            path,
            performance_score: kpi.score,
            adaptive_score,
            confidence,
            direction,
            adjustments,
            positions: self.positions.clone(),
        };

        tracing::debug!(
            user_id = %self.user_id,
            round = self.round_index,
            phase = ?phase,
            path = ?path,
            score = kpi.score,
            adaptive_score,
            confidence = confidence.total,
            direction = ?direction,
            "round recorded"
        );

        self.phases.complete_round();
        self.round_index = self.round_index.saturating_add(1);
        outcome
    }

    /// [`record_round`](Self::record_round) followed by an off-thread save.
    pub fn record_round_and_persist(
        &mut self,
        input: &RoundInput,
        writer: &DeferredWriter,
    ) -> (RoundOutcome, JoinHandle<PersistenceResult<bool>>) {
        let outcome = self.record_round(input);
        let handle = writer.submit(self.user_id.clone(), self.snapshot());
        (outcome, handle)
    }

    /// Positions as they should be stored: warm-up scaling removed, played
    /// movement kept.
    pub fn persisted_positions(&self) -> BTreeMap<DomTargetType, f64> {
        self.positions
            .iter()
            .map(|(dom, position)| {
                let offset = self.warmup_offsets.get(dom).copied().unwrap_or(0.0);
                (*dom, (position + offset).clamp(0.0, 1.0))
            })
            .collect()
    }

    pub fn snapshot(&self) -> PersistedAdmState {
        PersistedAdmState {
            version: self.schema_version.max(CURRENT_SCHEMA_VERSION),
            performance_history: self.history.entries().to_vec(),
            last_adaptation_direction: self.direction.last_direction,
            direction_stable_count: self.direction.stable_count,
            normalized_positions: self.persisted_positions(),
            dom_performance_profiles: Some(self.profiles.clone()),
            dom_convergence: Some(self.convergence.clone()),
            extra: self.carried_fields.clone(),
        }
    }

    pub fn save(&self) -> PersistenceResult<()> {
        self.services.store.save(&self.user_id, &self.snapshot())
    }

    /// Drops profile evidence and convergence tracking; positions are kept.
    pub fn reset_profiles(&mut self) {
        for profile in self.profiles.values_mut() {
            profile.clear();
        }
        for state in self.convergence.values_mut() {
            *state = ConvergenceState::default();
        }
        tracing::info!(user_id = %self.user_id, "dom profiles reset");
    }

    /// Removes this user's stored state and resets the in-memory evidence.
    pub fn clear_persisted(&mut self) -> PersistenceResult<()> {
        self.services.store.clear(&self.user_id)?;
        self.history.clear();
        self.direction.reset();
        self.reset_profiles();
        Ok(())
    }
}
