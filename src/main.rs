use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use adm_engine::adm::{
    AdmConfig, AdmEngine, DeferredWriter, DomTargetType, EngineServices, JsonFileStore,
    ManualClock, RoundInput, StateStore,
};
use adm_engine::config::Config;

const ROUND_SPACING_SECS: i64 = 45;
const PLAYER_SKILL: f64 = 0.62;

/// Deterministic stand-in for a player whose results degrade as difficulty passes their skill.
fn synthetic_round(engine: &AdmEngine, round: u32) -> RoundInput {
    let positions = engine.positions();
    let difficulty = positions.values().sum::<f64>() / positions.len().max(1) as f64;
    let jitter = (round as f64 * 1.7).sin() * 0.08;
    let margin = PLAYER_SKILL - difficulty + jitter;

    RoundInput {
        task_success: margin > -0.05,
        time_to_find_ratio: (0.5 - margin).clamp(0.05, 1.0),
        reaction_time_secs: (0.9 - margin * 1.5).clamp(0.25, 2.0),
        response_duration_secs: (4.0 - margin * 6.0).clamp(1.0, 10.0),
        tap_accuracy_error: (15.0 - margin * 40.0).clamp(0.0, 50.0),
        target_count: engine.game_parameter(DomTargetType::TargetCount) as u32,
        arousal: (0.45 + (round as f64 * 0.3).cos() * 0.2).clamp(0.0, 1.0),
        stress_level: None,
        session_context: Some("simulation".to_string()),
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.state_dir));
    let clock = Arc::new(ManualClock::new(chrono::Utc::now().timestamp_millis()));
    let services = EngineServices::new(Arc::clone(&store)).with_clock(clock.clone());

    let mut engine = match AdmEngine::new(AdmConfig::from_env(), &config.user_id, services) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "refusing to start with invalid adm config");
            std::process::exit(1);
        }
    };
    tracing::info!(
        state_dir = %config.state_dir.display(),
        user_id = %config.user_id,
        rounds = config.sim_rounds,
        "simulation starting"
    );

    let writer = DeferredWriter::new(Arc::clone(&store));
    let mut last_save = None;

    for round in 0..config.sim_rounds {
        let input = synthetic_round(&engine, round);
        let (outcome, handle) = engine.record_round_and_persist(&input, &writer);
        last_save = Some(handle);

        tracing::info!(
            round,
            phase = ?outcome.phase,
            score = format_args!("{:.3}", outcome.performance_score),
            confidence = format_args!("{:.3}", outcome.confidence.total),
            direction = ?outcome.direction,
            ball_speed = format_args!("{:.1}", engine.game_parameter(DomTargetType::MeanBallSpeed)),
            response_time = format_args!("{:.2}", engine.game_parameter(DomTargetType::ResponseTime)),
            targets = engine.game_parameter(DomTargetType::TargetCount),
            "round"
        );
        clock.advance_secs(ROUND_SPACING_SECS);
    }

    if let Some(handle) = last_save {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "final save failed"),
            Err(e) => tracing::error!(error = %e, "save task panicked"),
        }
    }

    for dom in DomTargetType::ALL {
        tracing::info!(
            dom = dom.as_str(),
            position = format_args!("{:.3}", engine.position(dom)),
            parameter = format_args!("{:.2}", engine.game_parameter(dom)),
            "final"
        );
    }
}
