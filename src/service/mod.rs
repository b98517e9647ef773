//! Engine services: model invocation, tools, and the triage pipeline.

pub mod llm;
pub mod tools;
pub mod triage;

pub use llm::{
    build_client, InvocationLimits, LanguageModelClient, LlmConfig, LlmError, LlmProvider,
    MockLlmClient, OpenAiChatClient,
};
pub use tools::{ToolContext, ToolError, ToolRegistry, TriageTool};
pub use triage::{CriteriaMatching, EngineSettings, TriageEngine, TriageError};
