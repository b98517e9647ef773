//! Tolerant parser for the model's semi-structured response.
//!
//! The model's output format is not contractually guaranteed, so this parser
//! is total: it never errors, substituting conservative defaults for anything
//! it cannot extract. Re-parsing identical text always yields identical
//! fields.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{ParsedFields, Specialty};

/// Conservative confidence used when the model's confidence is absent or
/// unparseable.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Matches a field label with or without markdown emphasis, case-insensitive:
/// `SPECIALTY:`, `**SPECIALTY:**`, `**Specialty**:` all count.
fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\*{0,2}(SPECIALTY|REASONING|CONFIDENCE|CLINICAL_DETAILS)\*{0,2}\s*:")
            .expect("label pattern is valid")
    })
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"))
}

/// A labeled segment: runs from the end of its label to the start of the next
/// label, or end of text.
fn labeled_segments(raw: &str) -> Vec<(String, String)> {
    let matches: Vec<_> = label_pattern().captures_iter(raw).collect();
    let mut segments = Vec::with_capacity(matches.len());
    for (i, captures) in matches.iter().enumerate() {
        let (Some(whole), Some(label)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let label = label.as_str().to_uppercase();
        let start = whole.end();
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(raw.len(), |m| m.start());
        let segment = raw[start..end]
            .trim()
            .trim_matches('*')
            .trim()
            .to_string();
        segments.push((label, segment));
    }
    segments
}

/// Extract typed fields from raw model text. Total: always returns
/// best-effort `ParsedFields`.
pub fn parse_model_response(raw: &str) -> ParsedFields {
    let segments = labeled_segments(raw);

    let first_segment = |label: &str| -> Option<&str> {
        segments
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| s.as_str())
    };

    let specialty = match first_segment("SPECIALTY") {
        Some(segment) => {
            // Label the model may have padded with prose; the specialty is the
            // first line.
            let first_line = segment.lines().next().unwrap_or_default();
            Specialty::detect(first_line)
        }
        None => {
            // No labeled output at all; scan the prose for a specialty mention
            // before giving up.
            Specialty::scan_mention(raw).unwrap_or(Specialty::Unknown)
        }
    };

    let confidence = first_segment("CONFIDENCE")
        .and_then(|segment| number_pattern().find(segment))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let reasoning = first_segment("REASONING").unwrap_or_default().to_string();
    let clinical_details = first_segment("CLINICAL_DETAILS")
        .unwrap_or_default()
        .to_string();

    if specialty == Specialty::Unknown {
        tracing::debug!("Model response did not yield a known specialty");
    }

    ParsedFields {
        specialty,
        reasoning,
        confidence,
        clinical_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_labels() {
        let raw = "SPECIALTY: NEUROLOGY\n\
                   REASONING: New onset seizures in a 5-year-old.\n\
                   CONFIDENCE: 0.92\n\
                   CLINICAL_DETAILS: witnessed tonic-clonic activity";
        let fields = parse_model_response(raw);
        assert_eq!(fields.specialty, Specialty::Neurology);
        assert_eq!(fields.reasoning, "New onset seizures in a 5-year-old.");
        assert!((fields.confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(fields.clinical_details, "witnessed tonic-clonic activity");
    }

    #[test]
    fn parses_markdown_emphasized_labels() {
        let raw = "**SPECIALTY:** CARDIOLOGY\n**REASONING**: Exertional chest pain.\n**CONFIDENCE:** 0.8";
        let fields = parse_model_response(raw);
        assert_eq!(fields.specialty, Specialty::Cardiology);
        assert_eq!(fields.reasoning, "Exertional chest pain.");
        assert!((fields.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn mixed_case_labels_are_accepted() {
        let raw = "Specialty: orthopedics\nConfidence: 0.7";
        let fields = parse_model_response(raw);
        assert_eq!(fields.specialty, Specialty::Orthopedics);
        assert!((fields.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn unlabeled_text_defaults_conservatively() {
        let fields = parse_model_response("I am unable to process this request.");
        assert_eq!(fields.specialty, Specialty::Unknown);
        assert!((fields.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(fields.reasoning, "");
        assert_eq!(fields.clinical_details, "");
    }

    #[test]
    fn unlabeled_prose_mention_is_scanned() {
        let fields =
            parse_model_response("The findings clearly necessitate cardiology evaluation.");
        assert_eq!(fields.specialty, Specialty::Cardiology);
        assert!((fields.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_specialty_label_maps_to_sentinel() {
        let fields = parse_model_response("SPECIALTY: TELEPATHY\nCONFIDENCE: 0.9");
        assert_eq!(fields.specialty, Specialty::Unknown);
    }

    #[test]
    fn confidence_is_clamped() {
        let fields = parse_model_response("SPECIALTY: NEUROLOGY\nCONFIDENCE: 7.5");
        assert!((fields.confidence - 1.0).abs() < f64::EPSILON);
        let fields = parse_model_response("SPECIALTY: NEUROLOGY\nCONFIDENCE: -2");
        assert!(fields.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_confidence_uses_default() {
        let fields = parse_model_response("SPECIALTY: NEUROLOGY\nCONFIDENCE: high");
        assert!((fields.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn reasoning_spans_until_next_label() {
        let raw = "SPECIALTY: NEUROLOGY\n\
                   REASONING: First sentence.\nSecond sentence continues here.\n\
                   CONFIDENCE: 0.9";
        let fields = parse_model_response(raw);
        assert!(fields.reasoning.contains("First sentence."));
        assert!(fields.reasoning.contains("Second sentence continues here."));
        assert!(!fields.reasoning.contains("0.9"));
    }

    #[test]
    fn parsing_is_idempotent() {
        let raw = "**SPECIALTY**: GASTROENTEROLOGY\nREASONING: Chronic abdominal pain.\nCONFIDENCE: 0.66";
        let first = parse_model_response(raw);
        let second = parse_model_response(raw);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_is_handled() {
        let fields = parse_model_response("");
        assert_eq!(fields.specialty, Specialty::Unknown);
        assert!((fields.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }
}
