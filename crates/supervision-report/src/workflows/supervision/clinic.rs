//! Clinic labels derived from free-text service location names.
//!
//! The parsing rules are data rather than code so they can be audited and
//! adjusted when location naming drifts. A rules file looks like:
//!
//! ```json
//! {
//!   "unknown_label": "Unknown Clinic",
//!   "rules": [
//!     { "marker": "ORGANIZATION: ", "terminator": "Clinic", "strip": [" 8528 Unive"] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

use super::domain::UNKNOWN_CLINIC;

#[derive(Debug, thiserror::Error)]
pub enum ClinicRuleError {
    #[error("failed to read clinic rules from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid clinic rules: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("clinic rule {index} has an empty marker")]
    EmptyMarker { index: usize },
}

/// One extraction rule: take the text after `marker`, cut it before
/// `terminator`, trim, then delete every `strip` fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicRule {
    pub marker: String,
    #[serde(default)]
    pub terminator: Option<String>,
    #[serde(default)]
    pub strip: Vec<String>,
}

impl ClinicRule {
    fn apply(&self, location: &str) -> Option<String> {
        let (_, rest) = location.split_once(self.marker.as_str())?;
        let clinic = match self.terminator.as_deref() {
            Some(terminator) => rest.split(terminator).next().unwrap_or(rest),
            None => rest,
        };

        let mut clinic = clinic.trim_end().to_string();
        for fragment in &self.strip {
            clinic = clinic.replace(fragment.as_str(), "");
        }

        let clinic = clinic.trim();
        if clinic.is_empty() {
            None
        } else {
            Some(clinic.to_string())
        }
    }
}

/// Ordered rule set; the first rule that yields a label wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicRules {
    pub rules: Vec<ClinicRule>,
    #[serde(default = "default_unknown_label")]
    pub unknown_label: String,
}

impl ClinicRules {
    pub fn standard() -> Self {
        Self {
            rules: vec![ClinicRule {
                marker: "ORGANIZATION: ".to_string(),
                terminator: Some("Clinic".to_string()),
                strip: vec![" 8528 Unive".to_string()],
            }],
            unknown_label: default_unknown_label(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ClinicRuleError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ClinicRuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ClinicRuleError> {
        let rules: Self = serde_json::from_reader(reader)?;
        if let Some(index) = rules.rules.iter().position(|rule| rule.marker.is_empty()) {
            return Err(ClinicRuleError::EmptyMarker { index });
        }
        Ok(rules)
    }

    /// Parsed clinic name, or `None` when no rule matches the location.
    pub fn resolve(&self, location: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(location))
    }
}

impl Default for ClinicRules {
    fn default() -> Self {
        Self::standard()
    }
}

fn default_unknown_label() -> String {
    UNKNOWN_CLINIC.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_rule_extracts_clinic_name() {
        let rules = ClinicRules::standard();
        assert_eq!(
            rules.resolve("ORGANIZATION: Round Rock Clinic - Suite 200").as_deref(),
            Some("Round Rock")
        );
        assert_eq!(
            rules.resolve("ORGANIZATION: Austin 8528 Unive Clinic").as_deref(),
            Some("Austin")
        );
        assert_eq!(
            rules.resolve("ORGANIZATION: Pflugerville").as_deref(),
            Some("Pflugerville")
        );
    }

    #[test]
    fn unmatched_locations_fall_back_to_unknown_label() {
        let rules = ClinicRules::standard();
        assert_eq!(rules.resolve("Client Home"), None);
        assert_eq!(rules.resolve("ORGANIZATION: Clinic"), None);
        assert_eq!(rules.resolve(""), None);
        assert_eq!(rules.unknown_label, UNKNOWN_CLINIC);
    }

    #[test]
    fn rules_load_from_json_in_order() {
        let json = r#"{
            "unknown_label": "Unassigned",
            "rules": [
                { "marker": "SITE/", "terminator": "/" },
                { "marker": "ORGANIZATION: ", "terminator": "Clinic" }
            ]
        }"#;
        let rules = ClinicRules::from_reader(json.as_bytes()).expect("rules parse");
        assert_eq!(
            rules.resolve("SITE/Cedar Park/Room 4").as_deref(),
            Some("Cedar Park")
        );
        assert_eq!(
            rules.resolve("ORGANIZATION: Leander Clinic").as_deref(),
            Some("Leander")
        );
        assert_eq!(rules.resolve("Telehealth"), None);
        assert_eq!(rules.unknown_label, "Unassigned");
    }

    #[test]
    fn empty_markers_are_rejected() {
        let json = r#"{ "rules": [ { "marker": "" } ] }"#;
        let error = ClinicRules::from_reader(json.as_bytes()).expect_err("empty marker");
        assert!(matches!(error, ClinicRuleError::EmptyMarker { index: 0 }));
    }
}
