//! Client configuration: the per-tenant rule set and tool enablement the
//! engine consumes at request start.
//!
//! Configurations are authored by an external admin interface; the engine only
//! reads a snapshot of the currently active version. Unknown rule `type`
//! values are preserved verbatim so round-tripping a configuration never loses
//! data, but only `specialty_urgent_mapping` rules are evaluated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule type discriminator. Unknown wire values land in `Custom` so they
/// survive serialization untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    SpecialtyUrgentMapping,
    TriageRules,
    Custom(String),
}

impl From<String> for RuleType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "specialty_urgent_mapping" => RuleType::SpecialtyUrgentMapping,
            "triage_rules" => RuleType::TriageRules,
            _ => RuleType::Custom(raw),
        }
    }
}

impl From<RuleType> for String {
    fn from(rule_type: RuleType) -> Self {
        match rule_type {
            RuleType::SpecialtyUrgentMapping => "specialty_urgent_mapping".to_string(),
            RuleType::TriageRules => "triage_rules".to_string(),
            RuleType::Custom(raw) => raw,
        }
    }
}

/// A single client rule. For `specialty_urgent_mapping` rules, `data` maps a
/// specialty label to a free-text urgency-criteria description; for other
/// types the payload is opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

/// Per-client tool enablement and parameters (e.g. lookback window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

/// A tenant's configuration snapshot: identity, version, rule set, tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfiguration {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version", deserialize_with = "de_version")]
    pub version: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

fn default_version() -> String {
    "v1".to_string()
}

/// Accepts version as either a string or an integer, normalizing to string.
fn de_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

impl ClientConfiguration {
    /// Rules of the evaluated type, in configured order.
    pub fn specialty_urgent_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(|r| r.rule_type == RuleType::SpecialtyUrgentMapping)
    }

    /// The named tool's config, if present and enabled for this client.
    pub fn enabled_tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name && t.enabled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration for client: {0}")]
    NotFound(String),

    #[error("Client configuration is inactive: {0}")]
    Inactive(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Read-only source of active client configurations.
///
/// Implementations hand back an owned snapshot; a request in flight keeps
/// using the snapshot it retrieved at its start even if the store is updated
/// concurrently.
pub trait ConfigStore: Send + Sync {
    fn get_active_config(&self, client_id: &str) -> Result<ClientConfiguration, ConfigError>;
}

/// Top-level configuration document as persisted by the admin interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub clients: Vec<ClientConfiguration>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// File-backed store reading the admin-managed JSON document on every lookup,
/// so each request sees a consistent point-in-time snapshot.
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load(&self) -> Result<ConfigDocument, ConfigError> {
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get_active_config(&self, client_id: &str) -> Result<ClientConfiguration, ConfigError> {
        let document = self.load()?;
        let client = document
            .clients
            .into_iter()
            .find(|c| c.id == client_id)
            .ok_or_else(|| ConfigError::NotFound(client_id.to_string()))?;
        if !client.active {
            return Err(ConfigError::Inactive(client_id.to_string()));
        }
        Ok(client)
    }
}

/// In-memory store for tests and embedded hosts.
#[derive(Default)]
pub struct InMemoryConfigStore {
    clients: BTreeMap<String, ClientConfiguration>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: ClientConfiguration) -> Self {
        self.clients.insert(client.id.clone(), client);
        self
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get_active_config(&self, client_id: &str) -> Result<ClientConfiguration, ConfigError> {
        let client = self
            .clients
            .get(client_id)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(client_id.to_string()))?;
        if !client.active {
            return Err(ConfigError::Inactive(client_id.to_string()));
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "clients": [{
            "id": "acme_childrens",
            "name": "Acme Children's Hospital",
            "version": 3,
            "active": true,
            "rules": [
                {
                    "id": "rule-1",
                    "type": "specialty_urgent_mapping",
                    "data": {"NEUROLOGY": "seizure, seizure-like events"}
                },
                {
                    "id": "rule-2",
                    "type": "future_predicate_rules",
                    "data": {"age_band": "0-5"}
                }
            ],
            "tools": [
                {"name": "check_patient_history", "enabled": true,
                 "config": {"max_history_years": 5}}
            ]
        }]
    }"#;

    #[test]
    fn parses_wire_format() {
        let doc: ConfigDocument = serde_json::from_str(SAMPLE).unwrap();
        let client = &doc.clients[0];
        assert_eq!(client.id, "acme_childrens");
        assert_eq!(client.version, "3");
        assert_eq!(client.rules.len(), 2);
        assert_eq!(client.rules[0].rule_type, RuleType::SpecialtyUrgentMapping);
        assert!(client.enabled_tool("check_patient_history").is_some());
        assert!(client.enabled_tool("validate_insurance").is_none());
    }

    #[test]
    fn unknown_rule_type_preserved_but_inert() {
        let doc: ConfigDocument = serde_json::from_str(SAMPLE).unwrap();
        let client = &doc.clients[0];
        assert_eq!(
            client.rules[1].rule_type,
            RuleType::Custom("future_predicate_rules".to_string())
        );
        // Inert: only the mapping rule participates in evaluation.
        assert_eq!(client.specialty_urgent_rules().count(), 1);
        // Preserved: serializing keeps the original type string.
        let round_tripped = serde_json::to_value(client).unwrap();
        assert_eq!(round_tripped["rules"][1]["type"], "future_predicate_rules");
    }

    #[test]
    fn inactive_client_is_refused() {
        let client = ClientConfiguration {
            id: "old".to_string(),
            name: String::new(),
            version: "v1".to_string(),
            active: false,
            rules: vec![],
            tools: vec![],
        };
        let store = InMemoryConfigStore::new().with_client(client);
        assert!(matches!(
            store.get_active_config("old"),
            Err(ConfigError::Inactive(_))
        ));
    }

    #[test]
    fn missing_client_is_not_found() {
        let store = InMemoryConfigStore::new();
        assert!(matches!(
            store.get_active_config("ghost"),
            Err(ConfigError::NotFound(_))
        ));
    }
}
