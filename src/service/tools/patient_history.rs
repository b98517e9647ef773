//! Patient history lookup tool.
//!
//! Read-only EHR snapshot lookup the model can call when a referral is
//! ambiguous. The backing data here is a fixture standing in for the client's
//! EHR integration; the lookback window comes from the tool's per-client
//! configuration.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use regex::Regex;
use serde_json::{json, Value};

use super::{ToolContext, ToolError, TriageTool};
use crate::service::llm::wire::ToolSpec;

const DEFAULT_LOOKBACK_YEARS: i64 = 5;
const DEFAULT_PATIENT_ID: &str = "DEMO_PATIENT";

fn mrn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)MRN[:\s]*([A-Z0-9]+)").expect("MRN pattern is valid")
    })
}

pub struct PatientHistoryTool {
    lookback_years: i64,
}

impl PatientHistoryTool {
    pub fn new(config: &BTreeMap<String, Value>) -> Self {
        let lookback_years = config
            .get("max_history_years")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_LOOKBACK_YEARS);
        Self { lookback_years }
    }

    /// Patient id from the call arguments, falling back to an MRN found in
    /// the referral text, then to the demo placeholder.
    fn resolve_patient_id(&self, arguments: &Value, ctx: &ToolContext) -> String {
        if let Some(id) = arguments.get("patient_id").and_then(Value::as_str) {
            if !id.is_empty() && id != DEFAULT_PATIENT_ID {
                return id.to_string();
            }
        }
        if let Some(captures) = mrn_pattern().captures(&ctx.referral_text) {
            let mrn = captures[1].to_string();
            tracing::debug!(patient_id = %mrn, "Extracted patient id from referral text");
            return mrn;
        }
        DEFAULT_PATIENT_ID.to_string()
    }
}

#[async_trait]
impl TriageTool for PatientHistoryTool {
    fn name(&self) -> &'static str {
        "check_patient_history"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::function(
            self.name(),
            "Look up the patient's recent medical history (visits, diagnoses, medications, \
             allergies) for additional context on ambiguous referrals.",
            json!({
                "type": "object",
                "properties": {
                    "patient_id": {
                        "type": "string",
                        "description": "Patient identifier or MRN; omit to use the MRN from the referral"
                    }
                },
                "required": []
            }),
        )
    }

    async fn execute(&self, arguments: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        // Simulated EHR query latency; the real integration replaces this.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let patient_id = self.resolve_patient_id(arguments, ctx);
        let now = Utc::now();
        let window_start = now - Duration::days(self.lookback_years * 365);

        let entries = [
            (90, "Annual Physical", "Routine checkup", "Dr. Smith"),
            (365, "Urgent Care", "Upper respiratory infection", "Dr. Johnson"),
        ];
        let history_entries: Vec<Value> = entries
            .iter()
            .map(|(days_ago, visit_type, diagnosis, provider)| {
                (now - Duration::days(*days_ago), visit_type, diagnosis, provider)
            })
            .filter(|(date, ..)| *date >= window_start)
            .map(|(date, visit_type, diagnosis, provider)| {
                json!({
                    "date": date.format("%Y-%m-%d").to_string(),
                    "visit_type": visit_type,
                    "diagnosis": diagnosis,
                    "provider": provider,
                })
            })
            .collect();

        let last_visit_date = (now - Duration::days(90)).format("%Y-%m-%d").to_string();

        Ok(json!({
            "patient_id": patient_id,
            "history_entries": history_entries,
            "medications": ["Lisinopril 10mg daily", "Metformin 500mg twice daily"],
            "allergies": ["Penicillin", "Shellfish"],
            "last_visit_date": last_visit_date,
            "lookback_years": self.lookback_years,
        }))
    }
}
