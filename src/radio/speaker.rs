//! Active-speaker attribution from transcript fragments.
//!
//! The table is priority ordered: the first rule whose keyword appears in the
//! fragment (case-insensitive) names the speaker, otherwise the default label.

use serde::{Deserialize, Serialize};

/// A single keyword → label rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerRule {
    pub keyword: String,
    pub label: String,
}

impl SpeakerRule {
    pub fn new(keyword: &str, label: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            label: label.to_string(),
        }
    }
}

/// Priority-ordered keyword table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTable {
    rules: Vec<SpeakerRule>,
    default_label: String,
}

impl SpeakerTable {
    pub fn new(rules: Vec<SpeakerRule>, default_label: &str) -> Self {
        Self {
            rules,
            default_label: default_label.to_string(),
        }
    }

    /// Label for a transcript fragment. First match wins.
    pub fn attribute(&self, transcript: &str) -> &str {
        let lowered = transcript.to_lowercase();
        self.rules
            .iter()
            // Keywords loaded from config may carry capitals
            .find(|rule| !rule.keyword.is_empty() && lowered.contains(&rule.keyword.to_lowercase()))
            .map(|rule| rule.label.as_str())
            .unwrap_or(&self.default_label)
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SpeakerTable {
        SpeakerTable::new(
            vec![
                SpeakerRule::new("dispatch", "DISPATCH"),
                SpeakerRule::new("unit 7", "UNIT 7"),
            ],
            "RX UNIT",
        )
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        assert_eq!(table().attribute("This is DISPATCH, over."), "DISPATCH");
        assert_eq!(table().attribute("Unit 7 copies"), "UNIT 7");
    }

    #[test]
    fn test_first_rule_wins() {
        // Both keywords present; dispatch has priority
        assert_eq!(table().attribute("Unit 7, Dispatch here"), "DISPATCH");
    }

    #[test]
    fn test_default_label_when_nothing_matches() {
        assert_eq!(table().attribute("Roger that"), "RX UNIT");
        assert_eq!(table().attribute(""), "RX UNIT");
    }

    #[test]
    fn test_rules_from_config_with_capitals() {
        let table = SpeakerTable::new(
            vec![SpeakerRule {
                keyword: "Overwatch".to_string(),
                label: "OVERWATCH".to_string(),
            }],
            "RX",
        );
        assert_eq!(table.attribute("overwatch is up"), "OVERWATCH");
    }
}
