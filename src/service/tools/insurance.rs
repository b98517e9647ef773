//! Insurance validation tool.
//!
//! Placeholder coverage lookup; real deployments wire this to the client's
//! payer integration. Kept read-only and idempotent like every triage tool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ToolContext, ToolError, TriageTool};
use crate::service::llm::wire::ToolSpec;

pub struct InsuranceValidationTool {
    system_label: String,
}

impl InsuranceValidationTool {
    pub fn new(config: &BTreeMap<String, Value>) -> Self {
        let system_label = config
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("insurance system")
            .to_string();
        Self { system_label }
    }
}

#[async_trait]
impl TriageTool for InsuranceValidationTool {
    fn name(&self) -> &'static str {
        "validate_insurance"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::function(
            self.name(),
            "Validate the patient's insurance coverage and retrieve copay details.",
            json!({
                "type": "object",
                "properties": {
                    "patient_id": {"type": "string"},
                    "insurance_id": {"type": "string"}
                },
                "required": []
            }),
        )
    }

    async fn execute(&self, arguments: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        // Simulated payer API latency; the real integration replaces this.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let patient_id = arguments
            .get("patient_id")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");
        let insurance_id = arguments
            .get("insurance_id")
            .and_then(Value::as_str)
            .unwrap_or("INS-12345");

        Ok(json!({
            "patient_id": patient_id,
            "insurance_id": insurance_id,
            "is_valid": true,
            "coverage_type": "PPO",
            "copay_amount": 25.0,
            "notes": format!("Validated via {}", self.system_label),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_coverage_snapshot() {
        let tool = InsuranceValidationTool::new(&BTreeMap::new());
        let result = tool
            .execute(&json!({"patient_id": "P-1"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result["patient_id"], "P-1");
        assert_eq!(result["is_valid"], true);
        assert_eq!(result["coverage_type"], "PPO");
    }
}
