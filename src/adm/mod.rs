pub mod clock;
pub mod config;
pub mod decision;
pub mod engine;
pub mod mapping;
pub mod modeling;
pub mod persistence;
pub mod sanitize;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdmConfig;
pub use engine::{AdmEngine, EngineServices};
pub use mapping::{DomParameterMapping, LinearDomMapping};
pub use persistence::{DeferredWriter, JsonFileStore, MemoryStore, StateStore};
pub use types::*;
