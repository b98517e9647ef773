//! Side-lookup tools the model may invoke mid-inference.
//!
//! Tools are statically known operations gated per client by `ToolConfig`
//! enablement. Every dispatch is time-bounded and fails soft: a timed-out or
//! failing tool yields a placeholder result and the overall request proceeds.

mod insurance;
mod patient_history;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::{ToolCallRecord, ToolConfig};
use crate::service::llm::wire::ToolSpec;

pub use insurance::InsuranceValidationTool;
pub use patient_history::PatientHistoryTool;

/// Default bound on a single tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not available for this client: {0}")]
    NotAvailable(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),
}

/// Request-scoped context a tool may consult. Read-only.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Full referral text, used e.g. for MRN extraction.
    pub referral_text: String,
}

/// A read-only, idempotent lookup operation callable by the model.
#[async_trait]
pub trait TriageTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Manifest entry advertised to the model.
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, arguments: &Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Capability-keyed registry of the tools enabled for one client, resolved
/// at request time from configuration data.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn TriageTool>>,
    ctx: ToolContext,
    call_timeout: Duration,
}

impl ToolRegistry {
    /// Resolve the enabled tools for a client configuration snapshot.
    pub fn for_client(configs: &[ToolConfig], ctx: ToolContext, call_timeout: Duration) -> Self {
        let mut tools: Vec<Arc<dyn TriageTool>> = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            match config.name.as_str() {
                "check_patient_history" => {
                    tools.push(Arc::new(PatientHistoryTool::new(&config.config)));
                }
                "validate_insurance" => {
                    tools.push(Arc::new(InsuranceValidationTool::new(&config.config)));
                }
                other => {
                    tracing::warn!(tool = %other, "Unknown tool in client configuration, ignoring");
                }
            }
        }
        tracing::debug!(tool_count = tools.len(), "Tool registry resolved for request");
        Self {
            tools,
            ctx,
            call_timeout,
        }
    }

    /// Registry with no tools; the model gets no manifest.
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            ctx: ToolContext::default(),
            call_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool manifest for the chat completion request.
    pub fn manifest(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Execute one model-requested tool call, bounded by the per-call timeout.
    ///
    /// Never errors: malformed arguments, unknown tools, timeouts, and tool
    /// failures all degrade to a placeholder result the model can read.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> ToolCallRecord {
        let started = Instant::now();

        // Malformed arguments skip the tool entirely; the model sees the
        // placeholder and may retry with well-formed arguments.
        let arguments: Value = match serde_json::from_str(raw_arguments) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    tool = %name,
                    error = %e,
                    "Malformed tool-call arguments from model, skipping tool"
                );
                return ToolCallRecord {
                    tool: name.to_string(),
                    arguments: Value::String(raw_arguments.to_string()),
                    result: json!({
                        "error": format!("Tool '{name}' skipped: malformed arguments")
                    }),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        let result = match self.tools.iter().find(|t| t.name() == name) {
            None => {
                let e = ToolError::NotAvailable(name.to_string());
                tracing::warn!(tool = %name, "Model requested a tool not enabled for this client");
                json!({"error": e.to_string()})
            }
            Some(tool) => {
                match tokio::time::timeout(self.call_timeout, tool.execute(&arguments, &self.ctx))
                    .await
                {
                    Ok(Ok(value)) => value,
                    Ok(Err(e)) => {
                        tracing::warn!(tool = %name, error = %e, "Tool execution failed");
                        json!({"error": e.to_string()})
                    }
                    Err(_) => {
                        tracing::warn!(
                            tool = %name,
                            timeout_ms = self.call_timeout.as_millis() as u64,
                            "Tool execution timed out"
                        );
                        json!({"error": format!("Tool '{name}' timed out")})
                    }
                }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(tool = %name, elapsed_ms, "Tool dispatch completed");

        ToolCallRecord {
            tool: name.to_string(),
            arguments,
            result,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn registry_with_history() -> ToolRegistry {
        let config = ToolConfig {
            name: "check_patient_history".to_string(),
            enabled: true,
            config: BTreeMap::new(),
        };
        ToolRegistry::for_client(
            &[config],
            ToolContext {
                referral_text: "Patient MRN: AB1234 presents with episodes.".to_string(),
            },
            DEFAULT_TOOL_TIMEOUT,
        )
    }

    #[test]
    fn disabled_tools_are_not_resolved() {
        let configs = vec![
            ToolConfig {
                name: "check_patient_history".to_string(),
                enabled: false,
                config: BTreeMap::new(),
            },
            ToolConfig {
                name: "validate_insurance".to_string(),
                enabled: true,
                config: BTreeMap::new(),
            },
        ];
        let registry =
            ToolRegistry::for_client(&configs, ToolContext::default(), DEFAULT_TOOL_TIMEOUT);
        let manifest = registry.manifest();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].function.name, "validate_insurance");
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_fails_soft() {
        let registry = registry_with_history();
        let record = registry.dispatch("validate_insurance", "{}").await;
        assert!(record.result["error"]
            .as_str()
            .unwrap()
            .contains("not available"));
    }

    #[tokio::test]
    async fn dispatch_skips_tool_on_malformed_arguments() {
        let registry = registry_with_history();
        let record = registry
            .dispatch("check_patient_history", "{not json at all")
            .await;
        // The tool body must not run: no history payload, only the placeholder.
        assert!(record.result.get("patient_id").is_none());
        assert!(record.result["error"]
            .as_str()
            .unwrap()
            .contains("malformed arguments"));
        assert_eq!(record.arguments, Value::String("{not json at all".to_string()));
    }

    #[tokio::test]
    async fn dispatch_times_out_softly() {
        let config = ToolConfig {
            name: "check_patient_history".to_string(),
            enabled: true,
            config: BTreeMap::new(),
        };
        let registry = ToolRegistry::for_client(
            &[config],
            ToolContext::default(),
            Duration::from_millis(10),
        );
        let record = registry.dispatch("check_patient_history", "{}").await;
        assert!(record.result["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    struct FlakyTool;

    #[async_trait]
    impl TriageTool for FlakyTool {
        fn name(&self) -> &'static str {
            "flaky_lookup"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::function("flaky_lookup", "always fails", json!({"type": "object"}))
        }

        async fn execute(&self, _: &Value, _: &ToolContext) -> Result<Value, ToolError> {
            Err(ToolError::Failed("upstream EHR returned 500".to_string()))
        }
    }

    #[tokio::test]
    async fn dispatch_converts_tool_failure_to_placeholder() {
        let registry = ToolRegistry {
            tools: vec![Arc::new(FlakyTool)],
            ctx: ToolContext::default(),
            call_timeout: DEFAULT_TOOL_TIMEOUT,
        };
        let record = registry.dispatch("flaky_lookup", "{}").await;
        assert!(record.result["error"]
            .as_str()
            .unwrap()
            .contains("upstream EHR returned 500"));
    }

    #[tokio::test]
    async fn dispatch_extracts_mrn_from_referral() {
        let registry = registry_with_history();
        let record = registry.dispatch("check_patient_history", "{}").await;
        assert_eq!(record.result["patient_id"], "AB1234");
    }
}
