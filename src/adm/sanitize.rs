//! Input sanitization
//!
//! Upstream measurements are clamped at ingestion rather than rejected, so a
//! malformed round never stalls the control loop.

use crate::adm::types::RoundInput;

/// Clamp into [0, 1]; NaN and infinities become `fallback`.
pub fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// Clamp into [0, max]; NaN and infinities become `fallback`.
pub fn clamp_non_negative(value: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        fallback
    }
}

/// Stress readings arrive on a 0-100 scale; maps them onto [0, 1] arousal.
pub fn stress_to_arousal(stress: f64) -> f64 {
    clamp_non_negative(stress, 100.0, 50.0) / 100.0
}

pub fn sanitize_round_input(input: &RoundInput) -> RoundInput {
    RoundInput {
        task_success: input.task_success,
        time_to_find_ratio: clamp_non_negative(input.time_to_find_ratio, f64::MAX, 1.0),
        reaction_time_secs: clamp_non_negative(input.reaction_time_secs, f64::MAX, 0.0),
        response_duration_secs: clamp_non_negative(input.response_duration_secs, f64::MAX, 0.0),
        tap_accuracy_error: clamp_non_negative(input.tap_accuracy_error, f64::MAX, 0.0),
        target_count: input.target_count,
        arousal: match input.stress_level {
            Some(stress) => stress_to_arousal(stress),
            None => clamp_unit(input.arousal, 0.5),
        },
        stress_level: input.stress_level.map(|s| clamp_non_negative(s, 100.0, 50.0)),
        session_context: input.session_context.clone(),
    }
}
