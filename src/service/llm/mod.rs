//! Language model client and invocation adapter.
//!
//! Wraps the OpenAI-compatible chat/completions exchange, including the
//! tool-call round-trip loop. The loop is an explicit bounded iteration: a
//! hard round cap prevents runaway tool loops and a wall-clock budget covers
//! all model and tool round trips combined. Provider configuration is an
//! explicit struct constructed once at process start; the adapter holds no
//! ambient global state.

pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::model::ModelExchange;
use crate::service::tools::ToolRegistry;
use wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ToolSpec};

const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_LLM_BASE_URL: &str = "LLM_BASE_URL";
const ENV_LLM_MODEL: &str = "LLM_MODEL";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LOCAL_MODEL: &str = "qwen/qwen3-4b-thinking-2507";

/// All adapter failures collapse to a single `ModelUnavailable` condition at
/// the engine boundary; the variants exist so retry policy can distinguish
/// transient network errors (retried) from auth and malformed-response
/// errors (never retried).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("Model authentication rejected: {0}")]
    Auth(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Request budget of {0:?} exceeded")]
    BudgetExceeded(Duration),
}

/// Bounds on a single invocation: provider rounds, retries, wall clock.
#[derive(Debug, Clone)]
pub struct InvocationLimits {
    /// Maximum tool-call rounds before the loop terminates with whatever
    /// assistant text was produced.
    pub max_tool_rounds: usize,
    /// Bounded retry count for transient network errors only.
    pub max_retries: u32,
    /// Initial backoff between retries, doubled each attempt.
    pub retry_backoff: Duration,
    /// Hard wall-clock budget covering all model and tool round trips.
    pub wall_clock_budget: Duration,
}

impl Default for InvocationLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: 4,
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            wall_clock_budget: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Official OpenAI endpoint.
    OpenAi,
    /// Local OpenAI-compatible endpoint (e.g. llama.cpp, vLLM, LM Studio).
    Local,
    /// No usable credentials; the mock client keeps the pipeline exercisable.
    Test,
}

/// Provider configuration, constructed once at process start and passed into
/// the adapter by reference.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: Url,
    pub model: String,
    pub api_key: Option<String>,
}

impl LlmConfig {
    /// Auto-detect provider configuration from the environment.
    ///
    /// A valid (non-`dummy`) `OPENAI_API_KEY` selects the official endpoint;
    /// `LLM_BASE_URL` plus any key selects a local OpenAI-compatible
    /// endpoint; with neither, test mode is configured so the rest of the
    /// pipeline remains exercisable without credentials.
    pub fn from_env() -> Self {
        // Load .env if present (ignore if missing)
        let _ = dotenvy::dotenv();

        let api_key = std::env::var(ENV_OPENAI_API_KEY).ok().filter(|k| !k.is_empty());
        let env_model = std::env::var(ENV_LLM_MODEL).ok().filter(|m| !m.is_empty());
        let local_base = std::env::var(ENV_LLM_BASE_URL).ok().filter(|u| !u.is_empty());

        match (&api_key, &local_base) {
            (Some(key), _) if !key.starts_with("dummy") => {
                // Ignore LLM_MODEL when it names a local model
                let model = env_model
                    .filter(|m| !m.starts_with("qwen"))
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                let base_url = Url::parse(OPENAI_BASE_URL).expect("static URL is valid");
                tracing::info!(provider = "openai", model = %model, "LLM configuration detected");
                Self {
                    provider: LlmProvider::OpenAi,
                    base_url,
                    model,
                    api_key,
                }
            }
            (Some(_), Some(base)) => match Url::parse(base) {
                Ok(base_url) => {
                    let model = env_model.unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
                    tracing::info!(
                        provider = "local",
                        model = %model,
                        endpoint = %base_url,
                        "LLM configuration detected"
                    );
                    Self {
                        provider: LlmProvider::Local,
                        base_url,
                        model,
                        api_key,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid LLM_BASE_URL, falling back to test mode");
                    Self::test_mode()
                }
            },
            _ => {
                tracing::warn!("No usable LLM credentials found, running in test mode");
                Self::test_mode()
            }
        }
    }

    pub fn test_mode() -> Self {
        Self {
            provider: LlmProvider::Test,
            base_url: Url::parse(OPENAI_BASE_URL).expect("static URL is valid"),
            model: "mock".to_string(),
            api_key: None,
        }
    }
}

/// A single call/response cycle against the model, tool round-trips included.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Model identifier recorded in result provenance.
    fn model_id(&self) -> &str;

    /// Run one full exchange: system + user instruction in, final assistant
    /// text (plus tool-call records) out.
    async fn invoke(
        &self,
        system_instruction: &str,
        user_instruction: &str,
        registry: &ToolRegistry,
    ) -> Result<ModelExchange, LlmError>;
}

/// Build the model client for the detected provider: mock in test mode, the
/// HTTP adapter otherwise.
pub fn build_client(config: &LlmConfig, limits: InvocationLimits) -> Arc<dyn LanguageModelClient> {
    match config.provider {
        LlmProvider::Test => Arc::new(MockLlmClient::default()),
        _ => Arc::new(OpenAiChatClient::new(config.clone(), limits)),
    }
}

/// HTTP adapter speaking the OpenAI-compatible chat/completions format.
pub struct OpenAiChatClient {
    http: reqwest::Client,
    config: LlmConfig,
    limits: InvocationLimits,
}

impl OpenAiChatClient {
    pub fn new(config: LlmConfig, limits: InvocationLimits) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("referral-triage/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            config,
            limits,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }

    async fn send_once(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            tools: tools.map(<[ToolSpec]>::to_vec),
            temperature: Some(0.0),
        };

        let mut request = self.http.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            LlmError::Unavailable(format!("request to model endpoint failed: {e}"))
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::Auth(format!("provider returned {status}")));
        }
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(LlmError::Unavailable(format!("provider returned {status}")));
        }
        if !status.is_success() {
            return Err(LlmError::MalformedResponse(format!(
                "provider returned {status}"
            )));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }

    /// Bounded retry with doubling backoff, for transient endpoint errors
    /// only. Auth and malformed-response errors are returned immediately.
    async fn send_with_retry(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let mut backoff = self.limits.retry_backoff;
        let mut attempt = 0u32;
        loop {
            match self.send_once(messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e @ LlmError::Unavailable(_)) if attempt < self.limits.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient model endpoint error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_exchange(
        &self,
        system_instruction: &str,
        user_instruction: &str,
        registry: &ToolRegistry,
    ) -> Result<ModelExchange, LlmError> {
        let mut messages = vec![
            ChatMessage::system(system_instruction),
            ChatMessage::user(user_instruction),
        ];
        let manifest = if registry.is_empty() {
            None
        } else {
            Some(registry.manifest())
        };

        let mut records = Vec::new();
        let mut final_text = String::new();

        // One initial call plus at most max_tool_rounds tool round-trips.
        for round in 0..=self.limits.max_tool_rounds {
            let response = self
                .send_with_retry(&messages, manifest.as_deref())
                .await?;
            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::MalformedResponse("response has no choices".into()))?;

            if let Some(content) = choice.message.content {
                if !content.trim().is_empty() {
                    final_text = content;
                }
            }

            let tool_calls = choice.message.tool_calls.unwrap_or_default();
            if tool_calls.is_empty() {
                break;
            }
            if round == self.limits.max_tool_rounds {
                tracing::warn!(
                    rounds = self.limits.max_tool_rounds,
                    "Tool round cap reached, proceeding with last assistant text"
                );
                break;
            }

            messages.push(ChatMessage::assistant_tool_calls(tool_calls.clone()));
            for call in tool_calls {
                let record = registry
                    .dispatch(&call.function.name, &call.function.arguments)
                    .await;
                let payload = serde_json::to_string(&record.result).unwrap_or_default();
                messages.push(ChatMessage::tool_result(call.id, payload));
                records.push(record);
            }
        }

        Ok(ModelExchange {
            text: final_text,
            tool_calls: records,
        })
    }
}

#[async_trait]
impl LanguageModelClient for OpenAiChatClient {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn invoke(
        &self,
        system_instruction: &str,
        user_instruction: &str,
        registry: &ToolRegistry,
    ) -> Result<ModelExchange, LlmError> {
        let budget = self.limits.wall_clock_budget;
        match tokio::time::timeout(
            budget,
            self.run_exchange(system_instruction, user_instruction, registry),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::BudgetExceeded(budget)),
        }
    }
}

/// Scripted behavior for the mock client.
#[derive(Debug, Clone)]
enum MockBehavior {
    Text(String),
    Unavailable(String),
    /// Dispatch one tool call through the registry, then answer with text.
    CallToolThen {
        tool: String,
        arguments: String,
        text: String,
    },
}

/// Test-mode client: returns a fixed well-formed response without touching
/// the network. Also used by tests to script tool calls and failures.
pub struct MockLlmClient {
    behavior: MockBehavior,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::with_text(
            "SPECIALTY: GENERAL_SURGERY\n\
             REASONING: Test mode response; no model credentials configured.\n\
             CONFIDENCE: 0.5\n\
             CLINICAL_DETAILS: none",
        )
    }
}

impl MockLlmClient {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Text(text.into()),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Unavailable(reason.into()),
        }
    }

    pub fn call_tool_then(
        tool: impl Into<String>,
        arguments: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            behavior: MockBehavior::CallToolThen {
                tool: tool.into(),
                arguments: arguments.into(),
                text: text.into(),
            },
        }
    }
}

#[async_trait]
impl LanguageModelClient for MockLlmClient {
    fn model_id(&self) -> &str {
        "mock"
    }

    async fn invoke(
        &self,
        _system_instruction: &str,
        _user_instruction: &str,
        registry: &ToolRegistry,
    ) -> Result<ModelExchange, LlmError> {
        match &self.behavior {
            MockBehavior::Text(text) => Ok(ModelExchange {
                text: text.clone(),
                tool_calls: Vec::new(),
            }),
            MockBehavior::Unavailable(reason) => Err(LlmError::Unavailable(reason.clone())),
            MockBehavior::CallToolThen {
                tool,
                arguments,
                text,
            } => {
                let record = registry.dispatch(tool, arguments).await;
                Ok(ModelExchange {
                    text: text.clone(),
                    tool_calls: vec![record],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_defaults_are_bounded() {
        let limits = InvocationLimits::default();
        assert!(limits.max_tool_rounds > 0);
        assert!(limits.wall_clock_budget >= Duration::from_secs(1));
    }

    #[test]
    fn completions_url_handles_trailing_slash() {
        let mut config = LlmConfig::test_mode();
        config.base_url = Url::parse("http://localhost:1234/v1/").unwrap();
        let client = OpenAiChatClient::new(config, InvocationLimits::default());
        assert_eq!(
            client.completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn mock_default_returns_well_formed_text() {
        let client = MockLlmClient::default();
        let exchange = client
            .invoke("system", "user", &ToolRegistry::empty())
            .await
            .unwrap();
        assert!(exchange.text.contains("SPECIALTY:"));
        assert!(exchange.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn mock_unavailable_surfaces_error() {
        let client = MockLlmClient::unavailable("connection refused");
        let result = client.invoke("s", "u", &ToolRegistry::empty()).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }
}
