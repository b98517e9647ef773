//! Triage request/result types and intermediate pipeline values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::specialty::Specialty;

/// A triage request: one referral document for one tenant.
///
/// Immutable once constructed; the engine never mutates its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageInput {
    /// Tenant identifier used for configuration lookup.
    pub client_id: String,
    /// Referral document text, one string per page/segment.
    pub referral_text: Vec<String>,
    /// Caller-supplied metadata, passed through untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TriageInput {
    pub fn new(client_id: impl Into<String>, referral_text: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            referral_text,
            metadata: BTreeMap::new(),
        }
    }

    /// The referral joined into a single text block.
    pub fn full_text(&self) -> String {
        self.referral_text.join("\n\n")
    }
}

/// Pipeline stage, recorded in the result for audit reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageStage {
    Received,
    Normalized,
    Prompted,
    ModelInvoked,
    Parsed,
    Ruled,
    Assembled,
    Errored,
}

impl std::fmt::Display for TriageStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriageStage::Received => "RECEIVED",
            TriageStage::Normalized => "NORMALIZED",
            TriageStage::Prompted => "PROMPTED",
            TriageStage::ModelInvoked => "MODEL_INVOKED",
            TriageStage::Parsed => "PARSED",
            TriageStage::Ruled => "RULED",
            TriageStage::Assembled => "ASSEMBLED",
            TriageStage::Errored => "ERRORED",
        };
        f.write_str(name)
    }
}

/// Per-stage timing breakdown, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub normalize_ms: u64,
    pub prompt_ms: u64,
    pub model_ms: u64,
    pub parse_ms: u64,
    pub rules_ms: u64,
    pub total_ms: u64,
}

/// One tool invocation made by the model mid-inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
    pub elapsed_ms: u64,
}

/// Raw outcome of a single model exchange: final assistant text plus any tool
/// calls executed during the round-trip loop.
#[derive(Debug, Clone, Default)]
pub struct ModelExchange {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Typed fields extracted from the model's semi-structured response.
///
/// Always well-formed: the parser substitutes conservative defaults rather
/// than failing, so `specialty` is vocabulary-validated and `confidence` is
/// clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub specialty: Specialty,
    pub reasoning: String,
    pub confidence: f64,
    pub clinical_details: String,
}

/// Provenance and audit metadata attached to every result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageMetadata {
    /// Version of the prompt template that produced this result.
    pub prompt_version: String,
    /// Version of the client configuration snapshot used for rule evaluation.
    pub rules_version: String,
    /// Model identifier the adapter invoked (or "mock" in test mode).
    pub model_id: String,
    /// Fresh id assigned to this request, for log correlation.
    pub request_id: String,
    /// Terminal stage reached by the pipeline.
    pub stage: TriageStage,
    pub timings: StageTimings,
    /// Tool invocations made during inference.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Populated when the pipeline degraded instead of completing normally.
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Final auditable triage decision. Produced exactly once per request and
/// never mutated after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    /// Detected specialty, always a member of the canonical vocabulary.
    pub specialty: Specialty,
    /// 1 for urgent, 0 for routine. Computed purely from the detected
    /// specialty plus the client's mapping rules, never from model judgment.
    pub urgency: u8,
    /// Supporting rationale taken from the model's reasoning.
    pub evidence: String,
    /// Model confidence in the specialty detection, clamped to [0, 1].
    pub confidence: f64,
    pub metadata: TriageMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_full_text_joins_pages() {
        let input = TriageInput::new("acme", vec!["page one".into(), "page two".into()]);
        assert_eq!(input.full_text(), "page one\n\npage two");
    }

    #[test]
    fn stage_serializes_as_wire_name() {
        let json = serde_json::to_string(&TriageStage::ModelInvoked).unwrap();
        assert_eq!(json, "\"MODEL_INVOKED\"");
    }
}
