//! Domain models for the triage engine.

pub mod config;
pub mod specialty;
pub mod triage;

pub use config::{
    ClientConfiguration, ConfigDocument, ConfigError, ConfigStore, InMemoryConfigStore,
    JsonFileConfigStore, Rule, RuleType, ToolConfig,
};
pub use specialty::Specialty;
pub use triage::{
    ModelExchange, ParsedFields, StageTimings, ToolCallRecord, TriageInput, TriageMetadata,
    TriageResult, TriageStage,
};
