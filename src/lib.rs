//! Referral triage decision engine.
//!
//! Analyzes unstructured medical referral documents: a language model infers
//! the specialty (optionally invoking side-lookup tools mid-reasoning), then
//! deterministic, client-specific rules compute a binary urgency flag. The
//! result is auditable: specialty always from a closed vocabulary, urgency
//! never decided by the model, and every result stamped with the prompt and
//! rules versions that produced it.
//!
//! The sole operation hosts bind to is [`TriageEngine::analyze`] (or
//! [`TriageEngine::analyze_blocking`] for synchronous callers):
//!
//! ```no_run
//! use std::sync::Arc;
//! use referral_triage::{
//!     build_client, EngineSettings, InvocationLimits, JsonFileConfigStore, LlmConfig,
//!     TriageEngine, TriageInput,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let llm_config = LlmConfig::from_env();
//! let llm = build_client(&llm_config, InvocationLimits::default());
//! let store = Arc::new(JsonFileConfigStore::new("client_config.json"));
//! let engine = TriageEngine::new(store, llm);
//!
//! let input = TriageInput::new(
//!     "acme_childrens",
//!     vec!["5-year-old with new onset seizures".to_string()],
//! );
//! let result = engine.analyze(input).await?;
//! println!("{} urgency={}", result.specialty, result.urgency);
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod service;

pub use model::{
    ClientConfiguration, ConfigDocument, ConfigError, ConfigStore, InMemoryConfigStore,
    JsonFileConfigStore, ParsedFields, Rule, RuleType, Specialty, ToolCallRecord, ToolConfig,
    TriageInput, TriageMetadata, TriageResult, TriageStage,
};
pub use service::{
    build_client, CriteriaMatching, EngineSettings, InvocationLimits, LanguageModelClient,
    LlmConfig, LlmError, LlmProvider, MockLlmClient, OpenAiChatClient, ToolRegistry, TriageEngine,
    TriageError, TriageTool,
};
