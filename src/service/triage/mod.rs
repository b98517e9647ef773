//! Triage decision engine.
//!
//! Sequences the pipeline: normalize input, build prompts, invoke the model
//! (with tool round-trips), parse the response, evaluate deterministic
//! urgency rules, and assemble the auditable result. Each request is an
//! independent, stateless unit of work over a configuration snapshot fetched
//! at its start; the model call is the sole suspension point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{
    ClientConfiguration, ConfigStore, ModelExchange, ParsedFields, Specialty, StageTimings,
    TriageInput, TriageMetadata, TriageResult, TriageStage,
};
use crate::service::llm::LanguageModelClient;
use crate::service::tools::{ToolContext, ToolRegistry, DEFAULT_TOOL_TIMEOUT};

pub mod error;
pub mod parser;
pub mod prompts;
pub mod rules;

pub use error::TriageError;
pub use rules::CriteriaMatching;

/// Engine tuning knobs. Defaults are production values; tests shrink them.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Bound on a single tool execution.
    pub tool_call_timeout: Duration,
    /// Urgency-criteria matching policy (see `CriteriaMatching`).
    pub matching: CriteriaMatching,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tool_call_timeout: DEFAULT_TOOL_TIMEOUT,
            matching: CriteriaMatching::default(),
        }
    }
}

/// The triage decision engine. The sole operation any host binds to is
/// `analyze` (or its blocking variant).
pub struct TriageEngine {
    store: Arc<dyn ConfigStore>,
    llm: Arc<dyn LanguageModelClient>,
    settings: EngineSettings,
}

impl TriageEngine {
    pub fn new(store: Arc<dyn ConfigStore>, llm: Arc<dyn LanguageModelClient>) -> Self {
        Self::with_settings(store, llm, EngineSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn ConfigStore>,
        llm: Arc<dyn LanguageModelClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            llm,
            settings,
        }
    }

    /// Triage one referral. Async entry point; safe to call concurrently.
    ///
    /// Returns `Err` only for invalid input (empty referral, unknown or
    /// inactive client). An unavailable model yields an `Ok` degraded result
    /// with `specialty = UNKNOWN`, `urgency = 0`, and error metadata.
    pub async fn analyze(&self, input: TriageInput) -> Result<TriageResult, TriageError> {
        let request_id = Uuid::new_v4().to_string();
        let total_timer = Instant::now();
        let mut timings = StageTimings::default();

        tracing::debug!(
            request_id = %request_id,
            client_id = %input.client_id,
            pages = input.referral_text.len(),
            "Triage request received"
        );

        // RECEIVED -> NORMALIZED
        let stage_timer = Instant::now();
        let normalized = normalize(&input)?;
        let config = self.resolve_config(&input.client_id)?;
        timings.normalize_ms = stage_timer.elapsed().as_millis() as u64;

        // NORMALIZED -> PROMPTED
        let stage_timer = Instant::now();
        let mapping = active_mapping(&config);
        let system = prompts::system_prompt();
        let user = prompts::build_user_prompt(&normalized, &mapping);
        timings.prompt_ms = stage_timer.elapsed().as_millis() as u64;

        let registry = ToolRegistry::for_client(
            &config.tools,
            ToolContext {
                referral_text: normalized.full_text(),
            },
            self.settings.tool_call_timeout,
        );

        // PROMPTED -> MODEL_INVOKED (sole suspension point)
        let stage_timer = Instant::now();
        let exchange = match self.llm.invoke(&system, &user, &registry).await {
            Ok(exchange) => exchange,
            Err(e) => {
                timings.model_ms = stage_timer.elapsed().as_millis() as u64;
                timings.total_ms = total_timer.elapsed().as_millis() as u64;
                tracing::error!(
                    request_id = %request_id,
                    client_id = %input.client_id,
                    model = %self.llm.model_id(),
                    error = %e,
                    "Model unavailable, returning degraded triage result"
                );
                return Ok(self.degraded_result(&request_id, &config, timings, e.to_string()));
            }
        };
        timings.model_ms = stage_timer.elapsed().as_millis() as u64;

        // MODEL_INVOKED -> PARSED (parser is total)
        let stage_timer = Instant::now();
        let parsed = parser::parse_model_response(&exchange.text);
        timings.parse_ms = stage_timer.elapsed().as_millis() as u64;

        // PARSED -> RULED
        let stage_timer = Instant::now();
        let evidence_text = format!("{} {}", parsed.reasoning, parsed.clinical_details);
        let outcome = rules::evaluate_urgency(
            parsed.specialty,
            &evidence_text,
            &config.rules,
            self.settings.matching,
        );
        timings.rules_ms = stage_timer.elapsed().as_millis() as u64;
        timings.total_ms = total_timer.elapsed().as_millis() as u64;

        // RULED -> ASSEMBLED
        let result = self.assemble(&request_id, &config, timings, parsed, outcome, exchange);

        tracing::info!(
            request_id = %request_id,
            client_id = %input.client_id,
            specialty = %result.specialty,
            urgency = result.urgency,
            confidence = result.confidence,
            prompt_version = %result.metadata.prompt_version,
            rules_version = %result.metadata.rules_version,
            model = %result.metadata.model_id,
            tool_calls = result.metadata.tool_calls.len(),
            total_ms = result.metadata.timings.total_ms,
            "Triage request completed"
        );

        Ok(result)
    }

    /// Blocking variant for synchronous hosts. Spins a current-thread runtime
    /// per call; must not be invoked from within an async runtime.
    pub fn analyze_blocking(&self, input: TriageInput) -> Result<TriageResult, TriageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.analyze(input))
    }

    fn resolve_config(&self, client_id: &str) -> Result<ClientConfiguration, TriageError> {
        self.store
            .get_active_config(client_id)
            .map_err(|e| TriageError::InvalidInput(e.to_string()))
    }

    fn assemble(
        &self,
        request_id: &str,
        config: &ClientConfiguration,
        timings: StageTimings,
        parsed: ParsedFields,
        outcome: rules::RuleOutcome,
        exchange: ModelExchange,
    ) -> TriageResult {
        let evidence = if parsed.reasoning.is_empty() {
            parsed.clinical_details.clone()
        } else {
            parsed.reasoning.clone()
        };
        TriageResult {
            specialty: parsed.specialty,
            urgency: outcome.urgency,
            evidence,
            confidence: parsed.confidence,
            metadata: TriageMetadata {
                prompt_version: prompts::PROMPT_VERSION.to_string(),
                rules_version: config.version.clone(),
                model_id: self.llm.model_id().to_string(),
                request_id: request_id.to_string(),
                stage: TriageStage::Assembled,
                timings,
                tool_calls: exchange.tool_calls,
                error: None,
                completed_at: Utc::now(),
            },
        }
    }

    /// Conservative, clearly labeled result for an unavailable model. The
    /// system prefers under-triaging loudly over failing a caller's request.
    fn degraded_result(
        &self,
        request_id: &str,
        config: &ClientConfiguration,
        timings: StageTimings,
        error: String,
    ) -> TriageResult {
        TriageResult {
            specialty: Specialty::Unknown,
            urgency: 0,
            evidence: format!("Triage analysis degraded: model unavailable ({error})"),
            confidence: 0.0,
            metadata: TriageMetadata {
                prompt_version: prompts::PROMPT_VERSION.to_string(),
                rules_version: config.version.clone(),
                model_id: self.llm.model_id().to_string(),
                request_id: request_id.to_string(),
                stage: TriageStage::Errored,
                timings,
                tool_calls: Vec::new(),
                error: Some(error),
                completed_at: Utc::now(),
            },
        }
    }
}

/// Validate and normalize the request: non-blank client id, whitespace-trimmed
/// pages, at least one non-empty page. The input itself is never mutated.
fn normalize(input: &TriageInput) -> Result<TriageInput, TriageError> {
    if input.client_id.trim().is_empty() {
        return Err(TriageError::InvalidInput("client_id is empty".to_string()));
    }
    let pages: Vec<String> = input
        .referral_text
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if pages.is_empty() {
        return Err(TriageError::InvalidInput(
            "referral_text contains no non-empty pages".to_string(),
        ));
    }
    Ok(TriageInput {
        client_id: input.client_id.trim().to_string(),
        referral_text: pages,
        metadata: input.metadata.clone(),
    })
}

/// The first `specialty_urgent_mapping` rule's data, for prompt context.
fn active_mapping(config: &ClientConfiguration) -> serde_json::Map<String, Value> {
    config
        .specialty_urgent_rules()
        .next()
        .map(|rule| rule.data.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_blank_client() {
        let input = TriageInput::new("  ", vec!["text".to_string()]);
        assert!(matches!(
            normalize(&input),
            Err(TriageError::InvalidInput(_))
        ));
    }

    #[test]
    fn normalize_rejects_whitespace_only_pages() {
        let input = TriageInput::new("acme", vec!["  ".to_string(), "\n".to_string()]);
        assert!(matches!(
            normalize(&input),
            Err(TriageError::InvalidInput(_))
        ));
    }

    #[test]
    fn normalize_trims_and_drops_empty_pages() {
        let input = TriageInput::new(
            " acme ",
            vec!["  page one  ".to_string(), "".to_string()],
        );
        let normalized = normalize(&input).unwrap();
        assert_eq!(normalized.client_id, "acme");
        assert_eq!(normalized.referral_text, vec!["page one".to_string()]);
    }
}
