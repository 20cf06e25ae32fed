use std::path::PathBuf;

/// Process-level settings for the simulator binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub user_id: String,
    pub sim_rounds: u32,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let state_dir = std::env::var("ADM_STATE_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let user_id = std::env::var("ADM_USER_ID").unwrap_or_else(|_| "local-player".to_string());

        let sim_rounds = std::env::var("ADM_SIM_ROUNDS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(40);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            state_dir,
            user_id,
            sim_rounds,
            log_level,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("adm")
}
