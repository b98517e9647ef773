//! Canonical medical specialty vocabulary
//!
//! The closed set of specialty labels the engine is allowed to emit, plus the
//! `UNKNOWN` sentinel. Every specialty that leaves the engine passes through
//! `Specialty::detect`, so downstream rule evaluation only ever sees members
//! of this vocabulary.

use serde::{Deserialize, Serialize};

/// Closed vocabulary of medical specialties.
///
/// Serialized as the upper-snake wire labels used in client rule mappings
/// (e.g. `NEUROLOGY`, `EAR_NOSE_AND_THROAT_OTOLARYNGOLOGY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Allergy,
    Audiology,
    Cardiology,
    Endocrinology,
    EarNoseAndThroatOtolaryngology,
    Gastroenterology,
    GeneralSurgery,
    GenderClinic,
    // Label spelling matches the configuration wire format in the field.
    HematologyAndoncology,
    Genetics,
    Gynecology,
    InfectiousDisease,
    Neurology,
    Nutrition,
    Ophthalmology,
    Orthopedics,
    OccupationalTherapy,
    PulmonaryFunctionTesting,
    PhysicalTherapy,
    PulmonologyRespiratoryAndSleepMedicine,
    SpeechTherapy,
    WoundCare,
    Unknown,
}

impl Specialty {
    /// All canonical specialties, in canonical order. Excludes `Unknown`,
    /// which is a sentinel rather than a routable specialty.
    pub const ALL: [Specialty; 22] = [
        Specialty::Allergy,
        Specialty::Audiology,
        Specialty::Cardiology,
        Specialty::Endocrinology,
        Specialty::EarNoseAndThroatOtolaryngology,
        Specialty::Gastroenterology,
        Specialty::GeneralSurgery,
        Specialty::GenderClinic,
        Specialty::HematologyAndoncology,
        Specialty::Genetics,
        Specialty::Gynecology,
        Specialty::InfectiousDisease,
        Specialty::Neurology,
        Specialty::Nutrition,
        Specialty::Ophthalmology,
        Specialty::Orthopedics,
        Specialty::OccupationalTherapy,
        Specialty::PulmonaryFunctionTesting,
        Specialty::PhysicalTherapy,
        Specialty::PulmonologyRespiratoryAndSleepMedicine,
        Specialty::SpeechTherapy,
        Specialty::WoundCare,
    ];

    /// Wire label for this specialty.
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Allergy => "ALLERGY",
            Specialty::Audiology => "AUDIOLOGY",
            Specialty::Cardiology => "CARDIOLOGY",
            Specialty::Endocrinology => "ENDOCRINOLOGY",
            Specialty::EarNoseAndThroatOtolaryngology => "EAR_NOSE_AND_THROAT_OTOLARYNGOLOGY",
            Specialty::Gastroenterology => "GASTROENTEROLOGY",
            Specialty::GeneralSurgery => "GENERAL_SURGERY",
            Specialty::GenderClinic => "GENDER_CLINIC",
            Specialty::HematologyAndoncology => "HEMATOLOGY_ANDONCOLOGY",
            Specialty::Genetics => "GENETICS",
            Specialty::Gynecology => "GYNECOLOGY",
            Specialty::InfectiousDisease => "INFECTIOUS_DISEASE",
            Specialty::Neurology => "NEUROLOGY",
            Specialty::Nutrition => "NUTRITION",
            Specialty::Ophthalmology => "OPHTHALMOLOGY",
            Specialty::Orthopedics => "ORTHOPEDICS",
            Specialty::OccupationalTherapy => "OCCUPATIONAL_THERAPY",
            Specialty::PulmonaryFunctionTesting => "PULMONARY_FUNCTION_TESTING",
            Specialty::PhysicalTherapy => "PHYSICAL_THERAPY",
            Specialty::PulmonologyRespiratoryAndSleepMedicine => {
                "PULMONOLOGY_RESPIRATORY_AND_SLEEP_MEDICINE"
            }
            Specialty::SpeechTherapy => "SPEECH_THERAPY",
            Specialty::WoundCare => "WOUND_CARE",
            Specialty::Unknown => "UNKNOWN",
        }
    }

    /// Comma-separated list of all canonical labels, for prompt construction.
    pub fn allowed_list() -> String {
        Specialty::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Match a model-produced label against the vocabulary.
    ///
    /// Case-insensitive exact match first, then substring containment either
    /// way against known labels (the model sometimes decorates the label,
    /// e.g. "NEUROLOGY (pediatric)"). Anything unmatched is `Unknown`.
    pub fn detect(candidate: &str) -> Specialty {
        let normalized = candidate
            .trim()
            .trim_matches(|c| c == '*' || c == '[' || c == ']');
        if normalized.is_empty() {
            return Specialty::Unknown;
        }
        let upper = normalized.to_uppercase().replace([' ', '-'], "_");

        for specialty in Specialty::ALL {
            if upper == specialty.as_str() {
                return specialty;
            }
        }
        if upper == "UNKNOWN" {
            return Specialty::Unknown;
        }
        // A candidate shorter than this is too ambiguous to claim a label by
        // containment (a bare "N" is a substring of half the vocabulary).
        const MIN_CONTAINMENT_LEN: usize = 4;
        for specialty in Specialty::ALL {
            let label = specialty.as_str();
            if upper.contains(label)
                || (upper.len() >= MIN_CONTAINMENT_LEN && label.contains(upper.as_str()))
            {
                return specialty;
            }
        }
        Specialty::Unknown
    }

    /// Scan free text for a specialty mention. Fallback when the model ignored
    /// the labeled output contract entirely.
    pub fn scan_mention(text: &str) -> Option<Specialty> {
        const MENTIONS: [(&str, Specialty); 12] = [
            ("neurolog", Specialty::Neurology),
            ("cardiolog", Specialty::Cardiology),
            ("orthoped", Specialty::Orthopedics),
            ("endocrinolog", Specialty::Endocrinology),
            ("gastroenterolog", Specialty::Gastroenterology),
            ("pulmonolog", Specialty::PulmonologyRespiratoryAndSleepMedicine),
            ("surgery", Specialty::GeneralSurgery),
            ("gynecolog", Specialty::Gynecology),
            ("ophthalmolog", Specialty::Ophthalmology),
            ("infectious", Specialty::InfectiousDisease),
            ("audiolog", Specialty::Audiology),
            ("allerg", Specialty::Allergy),
        ];
        let lower = text.to_lowercase();
        MENTIONS
            .iter()
            .find(|(term, _)| lower.contains(term))
            .map(|(_, specialty)| *specialty)
    }
}

impl std::fmt::Display for Specialty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
