//! Detection of safety-critical clinical content.
//!
//! A chunk flagged here must never be proposed for removal. Categories are
//! tested in a fixed order and only the first match is recorded.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::patterns::PatternSet;

/// Category of safety-critical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalCategory {
    Allergies,
    Anticoagulation,
    CodeStatus,
    Infusions,
    LinesDrainsAirway,
}

impl CriticalCategory {
    /// Detection order. Earlier categories win when several match.
    pub const ORDER: [CriticalCategory; 5] = [
        Self::Allergies,
        Self::Anticoagulation,
        Self::CodeStatus,
        Self::Infusions,
        Self::LinesDrainsAirway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allergies => "allergies",
            Self::Anticoagulation => "anticoagulation",
            Self::CodeStatus => "code_status",
            Self::Infusions => "infusions",
            Self::LinesDrainsAirway => "lines_drains_airway",
        }
    }

    fn patterns(&self) -> &'static PatternSet {
        match self {
            Self::Allergies => &ALLERGIES,
            Self::Anticoagulation => &ANTICOAGULATION,
            Self::CodeStatus => &CODE_STATUS,
            Self::Infusions => &INFUSIONS,
            Self::LinesDrainsAirway => &LINES_DRAINS_AIRWAY,
        }
    }
}

static ALLERGIES: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\ballerg(y|ies|ic)\b",
        r"(?i)\b(nkda|nkfa|nka)\b",
        r"(?i)\banaphyla(xis|ctic)\b",
        r"(?i)\bepi-?pen\b",
    ])
});

static ANTICOAGULATION: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\banti-?coagula(tion|nt|nts|ted)\b",
        r"(?i)\b(warfarin|coumadin|heparin|enoxaparin|lovenox|apixaban|eliquis)\b",
        r"(?i)\b(rivaroxaban|xarelto|dabigatran|pradaxa|edoxaban|savaysa)\b",
        r"(?i)\b(argatroban|bivalirudin|fondaparinux)\b",
    ])
});

static CODE_STATUS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\bcode status\b",
        r"(?i)\bfull code\b",
        r"(?i)\b(dnr|dni|dnar|polst|molst)\b",
        r"(?i)\bdo not (resuscitate|intubate)\b",
        r"(?i)\bcomfort (care|measures) only\b",
    ])
});

static INFUSIONS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\b(drip|gtt|infusion|infusing)\b",
        r"(?i)\b(norepinephrine|levophed|vasopressin|phenylephrine|epinephrine|dobutamine|milrinone)\b",
        r"(?i)\b(pressors?|vasopressors?)\b",
        r"(?i)\b(propofol|dexmedetomidine|precedex)\b",
        r"(?i)\btpn\b",
    ])
});

static LINES_DRAINS_AIRWAY: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(&[
        r"(?i)\b(central line|picc|a-?line|arterial line|port-a-cath)\b",
        r"(?i)\b(foley|chest tube|jp drain|drain|nephrostomy)\b",
        r"(?i)\b(ett|endotracheal|intubated|tracheostomy|trach)\b",
        r"(?i)\b(ng tube|og tube|peg tube|g-tube)\b",
        r"(?i)\b(ventilator|mechanical ventilation|bipap)\b",
    ])
});

/// Return the first critical category `text` falls into, if any.
pub fn detect_critical(text: &str) -> Option<CriticalCategory> {
    CriticalCategory::ORDER
        .into_iter()
        .find(|category| category.patterns().is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_warfarin_is_anticoagulation() {
        assert_eq!(
            detect_critical("Patient is on warfarin 5mg daily"),
            Some(CriticalCategory::Anticoagulation)
        );
    }

    #[test]
    fn test_first_category_wins() {
        // Matches allergies, anticoagulation and infusions.
        let text = "Allergic to penicillin. Heparin drip running.";
        assert_eq!(detect_critical(text), Some(CriticalCategory::Allergies));
    }

    #[test]
    fn test_code_status_and_lines() {
        assert_eq!(
            detect_critical("DNR/DNI confirmed with family"),
            Some(CriticalCategory::CodeStatus)
        );
        assert_eq!(
            detect_critical("Right IJ central line placed 3/2"),
            Some(CriticalCategory::LinesDrainsAirway)
        );
        assert_eq!(
            detect_critical("Norepinephrine titrated to MAP > 65"),
            Some(CriticalCategory::Infusions)
        );
    }

    #[test]
    fn test_ordinary_text_is_not_critical() {
        assert_eq!(detect_critical("Patient ambulating in hallway."), None);
        assert_eq!(detect_critical(""), None);
    }
}
