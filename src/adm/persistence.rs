//! Per-user state storage with schema migration.
//!
//! Documents are JSON. A document without a `version` field is the legacy
//! layout and is migrated to the current schema on load, then written back.
//! Documents from a newer schema load as-is and keep their unknown fields.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::adm::types::{
    AdaptationDirection, DomTargetType, PerformanceHistoryEntry, PersistedAdmState,
    CURRENT_SCHEMA_VERSION,
};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Keyed by user id. `load` never fails: missing or unreadable state is `None`.
pub trait StateStore: Send + Sync {
    fn load(&self, user_id: &str) -> Option<PersistedAdmState>;
    fn save(&self, user_id: &str, state: &PersistedAdmState) -> PersistenceResult<()>;
    fn clear(&self, user_id: &str) -> PersistenceResult<()>;
}

/// Legacy layout: no version, no profiles, no convergence tracking.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAdmState {
    #[serde(default)]
    pub performance_history: Vec<PerformanceHistoryEntry>,
    #[serde(default)]
    pub last_adaptation_direction: AdaptationDirection,
    #[serde(default)]
    pub direction_stable_count: u32,
    #[serde(default)]
    pub normalized_positions: std::collections::BTreeMap<DomTargetType, f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone)]
pub enum SchemaSnapshot {
    V1(LegacyAdmState),
    V2(PersistedAdmState),
    Future(PersistedAdmState),
}

impl SchemaSnapshot {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(raw)?;
        let version = match value.get("version") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                <serde_json::Error as serde::de::Error>::custom("version must be an unsigned integer")
            })?),
        };

        match version {
            None | Some(0) | Some(1) => {
                if let Some(object) = value.as_object_mut() {
                    object.remove("version");
                }
                Ok(Self::V1(serde_json::from_value(value)?))
            }
            Some(v) if v == CURRENT_SCHEMA_VERSION as u64 => {
                Ok(Self::V2(serde_json::from_value(value)?))
            }
            Some(_) => Ok(Self::Future(serde_json::from_value(value)?)),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(state) | Self::Future(state) => state.version,
        }
    }

    /// Returns the state in current shape and whether it must be written back.
    pub fn into_current(self) -> (PersistedAdmState, bool) {
        match self {
            Self::V1(mut legacy) => {
                legacy.extra.remove("domPerformanceProfiles");
                legacy.extra.remove("domConvergence");
                let state = PersistedAdmState {
                    version: CURRENT_SCHEMA_VERSION,
                    performance_history: legacy.performance_history,
                    last_adaptation_direction: legacy.last_adaptation_direction,
                    direction_stable_count: legacy.direction_stable_count,
                    normalized_positions: legacy.normalized_positions,
                    dom_performance_profiles: Some(PersistedAdmState::empty_profiles()),
                    dom_convergence: None,
                    extra: legacy.extra,
                };
                (state, true)
            }
            Self::V2(state) | Self::Future(state) => (state, false),
        }
    }
}

/// Decodes a stored document. Corrupt documents log a warning and yield `None`.
fn decode_document(user_id: &str, raw: &str) -> Option<(PersistedAdmState, bool)> {
    match SchemaSnapshot::decode(raw) {
        Ok(snapshot) => {
            let from = snapshot.version();
            if from > CURRENT_SCHEMA_VERSION {
                tracing::warn!(
                    user_id,
                    version = from,
                    "state written by a newer schema; unknown fields are carried through"
                );
            }
            let (state, migrated) = snapshot.into_current();
            if migrated {
                tracing::info!(user_id, from, to = CURRENT_SCHEMA_VERSION, "migrated persisted state");
            }
            Some((state, migrated))
        }
        Err(e) => {
            tracing::warn!(user_id, error = %e, "discarding corrupt persisted state");
            None
        }
    }
}

fn encode_document(state: &PersistedAdmState) -> PersistenceResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(state)?)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per user under a state directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// User ids are hex-encoded so any string maps to a safe file name.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir
            .join(format!("adm_state_{}.json", hex::encode(user_id.as_bytes())))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> PersistenceResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, user_id: &str) -> Option<PersistedAdmState> {
        let path = self.path_for(user_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(user_id, path = %path.display(), error = %e, "failed to read state");
                return None;
            }
        };

        let (state, migrated) = decode_document(user_id, &raw)?;
        if migrated {
            if let Err(e) = self.save(user_id, &state) {
                tracing::warn!(user_id, error = %e, "failed to write back migrated state");
            }
        }
        Some(state)
    }

    fn save(&self, user_id: &str, state: &PersistedAdmState) -> PersistenceResult<()> {
        let bytes = encode_document(state)?;
        self.write_atomic(&self.path_for(user_id), &bytes)?;
        tracing::debug!(user_id, bytes = bytes.len(), "state saved");
        Ok(())
    }

    fn clear(&self, user_id: &str) -> PersistenceResult<()> {
        match std::fs::remove_file(self.path_for(user_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds raw documents in memory; decodes exactly like [`JsonFileStore`].
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, user_id: &str, raw: impl Into<String>) {
        self.documents.lock().insert(user_id.to_string(), raw.into());
    }

    pub fn raw(&self, user_id: &str) -> Option<String> {
        self.documents.lock().get(user_id).cloned()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.documents.lock().contains_key(user_id)
    }
}

impl StateStore for MemoryStore {
    fn load(&self, user_id: &str) -> Option<PersistedAdmState> {
        let raw = self.raw(user_id)?;
        let (state, migrated) = decode_document(user_id, &raw)?;
        if migrated {
            if let Err(e) = self.save(user_id, &state) {
                tracing::warn!(user_id, error = %e, "failed to write back migrated state");
            }
        }
        Some(state)
    }

    fn save(&self, user_id: &str, state: &PersistedAdmState) -> PersistenceResult<()> {
        let bytes = encode_document(state)?;
        let raw = String::from_utf8(bytes).map_err(|e| {
            PersistenceError::Io(std::io::Error::new(ErrorKind::InvalidData, e))
        })?;
        self.insert_raw(user_id, raw);
        Ok(())
    }

    fn clear(&self, user_id: &str) -> PersistenceResult<()> {
        self.documents.lock().remove(user_id);
        Ok(())
    }
}

/// Moves saves off the caller's thread. Later submissions win per user.
///
/// Must be used from within a tokio runtime.
pub struct DeferredWriter {
    store: Arc<dyn StateStore>,
    next_seq: AtomicU64,
    written: Arc<Mutex<HashMap<String, u64>>>,
}

impl DeferredWriter {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            next_seq: AtomicU64::new(0),
            written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolves to `Ok(false)` when a newer submission for the same user already landed.
    pub fn submit(
        &self,
        user_id: impl Into<String>,
        state: PersistedAdmState,
    ) -> JoinHandle<PersistenceResult<bool>> {
        let user_id = user_id.into();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let store = Arc::clone(&self.store);
        let written = Arc::clone(&self.written);

        tokio::task::spawn_blocking(move || {
            let mut last = written.lock();
            if last.get(&user_id).is_some_and(|&landed| landed > seq) {
                tracing::debug!(user_id = %user_id, seq, "skipping stale deferred save");
                return Ok(false);
            }
            match store.save(&user_id, &state) {
                Ok(()) => {
                    last.insert(user_id, seq);
                    Ok(true)
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "deferred save failed");
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_version_decodes_as_legacy() {
        let raw = r#"{"performanceHistory":[],"normalizedPositions":{"meanBallSpeed":0.4}}"#;
        let snapshot = SchemaSnapshot::decode(raw).unwrap();
        assert!(matches!(snapshot, SchemaSnapshot::V1(_)));

        let (state, migrated) = snapshot.into_current();
        assert!(migrated);
        assert_eq!(state.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.dom_performance_profiles.map(|p| p.len()), Some(5));
        assert_eq!(state.normalized_positions[&DomTargetType::MeanBallSpeed], 0.4);
    }

    #[test]
    fn test_current_version_needs_no_writeback() {
        let raw = r#"{"version":2,"normalizedPositions":{}}"#;
        let (state, migrated) = SchemaSnapshot::decode(raw).unwrap().into_current();
        assert!(!migrated);
        assert_eq!(state.version, 2);
        assert!(state.dom_performance_profiles.is_none());
    }

    #[test]
    fn test_future_version_keeps_unknown_fields() {
        let raw = r#"{"version":7,"normalizedPositions":{"targetCount":0.3},"calibration":{"k":1}}"#;
        let snapshot = SchemaSnapshot::decode(raw).unwrap();
        assert!(matches!(snapshot, SchemaSnapshot::Future(_)));
        let (state, migrated) = snapshot.into_current();
        assert!(!migrated);
        assert_eq!(state.version, 7);
        assert_eq!(state.extra["calibration"]["k"], 1);

        let reencoded = serde_json::to_value(&state).unwrap();
        assert_eq!(reencoded["calibration"]["k"], 1);
        assert_eq!(reencoded["version"], 7);
    }

    #[test]
    fn test_non_numeric_version_is_corrupt() {
        assert!(SchemaSnapshot::decode(r#"{"version":"two"}"#).is_err());
        assert!(SchemaSnapshot::decode("not json").is_err());
    }

    #[test]
    fn test_memory_store_migrates_in_place() {
        let store = MemoryStore::new();
        store.insert_raw("u1", r#"{"lastAdaptationDirection":"increase","directionStableCount":2}"#);

        let state = store.load("u1").unwrap();
        assert_eq!(state.last_adaptation_direction, AdaptationDirection::Increase);
        assert_eq!(state.direction_stable_count, 2);

        let rewritten: Value = serde_json::from_str(&store.raw("u1").unwrap()).unwrap();
        assert_eq!(rewritten["version"], 2);
        assert!(rewritten["domPerformanceProfiles"].is_object());
    }

    #[test]
    fn test_memory_store_corrupt_is_none() {
        let store = MemoryStore::new();
        store.insert_raw("u1", "{oops");
        assert!(store.load("u1").is_none());
        assert!(store.load("nobody").is_none());
    }

    #[test]
    fn test_path_is_hex_encoded() {
        let store = JsonFileStore::new("/tmp/adm");
        let path = store.path_for("a/b");
        assert_eq!(path.file_name().unwrap(), "adm_state_612f62.json");
    }
}
