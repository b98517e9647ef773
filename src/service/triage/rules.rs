//! Deterministic urgency rule evaluation.
//!
//! The clinically load-bearing decision: urgency is computed purely from the
//! detected specialty, the evidence text, and the client's
//! `specialty_urgent_mapping` rules. Identical (specialty, evidence, ruleset)
//! triples always produce identical output, independent of model
//! non-determinism.

use regex::Regex;

use crate::model::{Rule, RuleType, Specialty};

/// Matching granularity for urgency-criteria phrases. The source behavior is
/// plain substring matching; word-boundary matching is available for clients
/// whose criteria contain short tokens prone to accidental containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CriteriaMatching {
    /// Case-insensitive substring containment of each criterion phrase.
    #[default]
    Substring,
    /// Case-insensitive match with word boundaries around the phrase.
    WordBoundary,
}

/// Outcome of rule evaluation, with enough detail for audit logging.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// 1 urgent, 0 routine.
    pub urgency: u8,
    /// Whether any mapping rule declared criteria for the detected specialty.
    pub specialty_mapped: bool,
    /// Id of the rule that was definitive, when one was.
    pub matched_rule_id: Option<String>,
    /// The criterion phrase found in the evidence, when urgency is 1.
    pub matched_criterion: Option<String>,
}

impl RuleOutcome {
    fn routine() -> Self {
        Self {
            urgency: 0,
            specialty_mapped: false,
            matched_rule_id: None,
            matched_criterion: None,
        }
    }
}

fn phrase_matches(evidence: &str, phrase: &str, matching: CriteriaMatching) -> bool {
    match matching {
        CriteriaMatching::Substring => evidence
            .to_lowercase()
            .contains(&phrase.to_lowercase()),
        CriteriaMatching::WordBoundary => {
            match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase))) {
                Ok(pattern) => pattern.is_match(evidence),
                // An unbuildable pattern falls back to the containment check.
                Err(_) => evidence.to_lowercase().contains(&phrase.to_lowercase()),
            }
        }
    }
}

/// Evaluate the detected specialty against the client's
/// `specialty_urgent_mapping` rules.
///
/// Rules are scanned in configured order; the first rule whose mapping
/// contains the specialty is definitive. Criteria are comma/semicolon
/// delimited phrases; any phrase found in the evidence means urgent. An empty
/// criteria string, or a specialty absent from every mapping (including
/// UNKNOWN), means routine: the rule set is conservative by omission.
pub fn evaluate_urgency(
    specialty: Specialty,
    evidence: &str,
    rules: &[Rule],
    matching: CriteriaMatching,
) -> RuleOutcome {
    for rule in rules
        .iter()
        .filter(|r| r.rule_type == RuleType::SpecialtyUrgentMapping)
    {
        let Some(criteria_value) = rule.data.get(specialty.as_str()) else {
            continue;
        };
        // First rule mapping this specialty is definitive.
        let criteria = criteria_value.as_str().unwrap_or_default();
        let matched = criteria
            .split([',', ';'])
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .find(|phrase| phrase_matches(evidence, phrase, matching));

        let outcome = match matched {
            Some(phrase) => RuleOutcome {
                urgency: 1,
                specialty_mapped: true,
                matched_rule_id: Some(rule.id.clone()),
                matched_criterion: Some(phrase.to_string()),
            },
            None => RuleOutcome {
                urgency: 0,
                specialty_mapped: true,
                matched_rule_id: Some(rule.id.clone()),
                matched_criterion: None,
            },
        };
        tracing::debug!(
            specialty = %specialty,
            rule_id = %rule.id,
            urgency = outcome.urgency,
            criterion = outcome.matched_criterion.as_deref().unwrap_or(""),
            "Urgency rule evaluated"
        );
        return outcome;
    }

    tracing::debug!(specialty = %specialty, "Specialty not present in any urgency mapping");
    RuleOutcome::routine()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping_rule(id: &str, data: serde_json::Value) -> Rule {
        let serde_json::Value::Object(data) = data else {
            unreachable!()
        };
        Rule {
            id: id.to_string(),
            rule_type: RuleType::SpecialtyUrgentMapping,
            data,
        }
    }

    fn seizure_rules() -> Vec<Rule> {
        vec![mapping_rule(
            "rule-1",
            json!({"NEUROLOGY": "seizure, seizure-like events"}),
        )]
    }

    #[test]
    fn criterion_match_is_urgent() {
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "New onset seizures in a 5-year-old.",
            &seizure_rules(),
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 1);
        assert_eq!(outcome.matched_criterion.as_deref(), Some("seizure"));
        assert_eq!(outcome.matched_rule_id.as_deref(), Some("rule-1"));
    }

    #[test]
    fn criterion_match_is_case_insensitive() {
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "Witnessed SEIZURE-like Events at school.",
            &seizure_rules(),
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 1);
    }

    #[test]
    fn mapped_specialty_without_match_is_routine() {
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "Chronic stable headaches.",
            &seizure_rules(),
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 0);
        assert!(outcome.specialty_mapped);
    }

    #[test]
    fn unmapped_specialty_is_routine_regardless_of_evidence() {
        let outcome = evaluate_urgency(
            Specialty::Cardiology,
            "seizure seizure seizure",
            &seizure_rules(),
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 0);
        assert!(!outcome.specialty_mapped);
    }

    #[test]
    fn unknown_specialty_is_routine() {
        let outcome = evaluate_urgency(
            Specialty::Unknown,
            "seizure",
            &seizure_rules(),
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 0);
    }

    #[test]
    fn empty_criteria_string_is_always_routine() {
        let rules = vec![mapping_rule("rule-1", json!({"NEUROLOGY": ""}))];
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "seizure",
            &rules,
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 0);
        assert!(outcome.specialty_mapped);
    }

    #[test]
    fn semicolon_delimited_criteria_are_split() {
        let rules = vec![mapping_rule(
            "rule-1",
            json!({"CARDIOLOGY": "chest pain; syncope; palpitations"}),
        )];
        let outcome = evaluate_urgency(
            Specialty::Cardiology,
            "Recurrent syncope during exertion.",
            &rules,
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 1);
        assert_eq!(outcome.matched_criterion.as_deref(), Some("syncope"));
    }

    #[test]
    fn first_definitive_rule_wins() {
        let rules = vec![
            mapping_rule("rule-1", json!({"NEUROLOGY": "stroke"})),
            mapping_rule("rule-2", json!({"NEUROLOGY": "seizure"})),
        ];
        // rule-1 maps NEUROLOGY, so it is definitive even though rule-2 would
        // have matched.
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "seizure activity",
            &rules,
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 0);
        assert_eq!(outcome.matched_rule_id.as_deref(), Some("rule-1"));
    }

    #[test]
    fn non_mapping_rules_are_ignored() {
        let rules = vec![
            Rule {
                id: "custom-1".to_string(),
                rule_type: RuleType::Custom("future_predicate_rules".to_string()),
                data: serde_json::Map::new(),
            },
            mapping_rule("rule-1", json!({"NEUROLOGY": "seizure"})),
        ];
        let outcome = evaluate_urgency(
            Specialty::Neurology,
            "seizure",
            &rules,
            CriteriaMatching::Substring,
        );
        assert_eq!(outcome.urgency, 1);
    }

    #[test]
    fn word_boundary_mode_rejects_accidental_containment() {
        let rules = vec![mapping_rule("rule-1", json!({"CARDIOLOGY": "MI"}))];
        let substring = evaluate_urgency(
            Specialty::Cardiology,
            "family history of migraine",
            &rules,
            CriteriaMatching::Substring,
        );
        assert_eq!(substring.urgency, 1);

        let bounded = evaluate_urgency(
            Specialty::Cardiology,
            "family history of migraine",
            &rules,
            CriteriaMatching::WordBoundary,
        );
        assert_eq!(bounded.urgency, 0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rules = seizure_rules();
        let evidence = "New onset seizures.";
        let first = evaluate_urgency(
            Specialty::Neurology,
            evidence,
            &rules,
            CriteriaMatching::Substring,
        );
        for _ in 0..5 {
            let again = evaluate_urgency(
                Specialty::Neurology,
                evidence,
                &rules,
                CriteriaMatching::Substring,
            );
            assert_eq!(first, again);
        }
    }
}
