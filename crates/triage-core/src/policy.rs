use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Versioned policy document. Exactly one version is active in the store at
/// any moment; a run pins whichever version was active at snapshot time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    #[serde(default)]
    pub extraction: ExtractionRules,
    #[serde(default)]
    pub qa: QaRules,
    #[serde(default)]
    pub prioritization: PrioritizationRules,
    #[serde(default)]
    pub category_requirements: BTreeMap<String, CategoryRequirements>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRules {
    #[serde(default)]
    pub required_confidence: f64,
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f64,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            required_confidence: 0.0,
            ambiguity_threshold: default_ambiguity_threshold(),
        }
    }
}

fn default_ambiguity_threshold() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QaRules {
    /// Field names that must be present and non-empty on every task.
    #[serde(default)]
    pub critical_fields: Vec<String>,
    #[serde(default)]
    pub reject_on_invalid_ids: bool,
    /// How many nullified required-field references are tolerated before the
    /// task is rejected as invalid.
    #[serde(default)]
    pub max_null_required_fields: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrioritizationRules {
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    /// Level name -> minimum score. A score equal to a threshold resolves to
    /// that level (ties go to the higher named level).
    #[serde(default = "default_priority_thresholds")]
    pub priority_thresholds: BTreeMap<String, f64>,
    /// Keywords that flag a task as complex for the complexity weight.
    #[serde(default)]
    pub complex_keywords: Vec<String>,
}

impl Default for PrioritizationRules {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            priority_thresholds: default_priority_thresholds(),
            complex_keywords: Vec::new(),
        }
    }
}

fn default_base_score() -> f64 {
    50.0
}

fn default_priority_thresholds() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("critical".to_string(), 80.0),
        ("high".to_string(), 60.0),
        ("medium".to_string(), 40.0),
        ("low".to_string(), 20.0),
    ])
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationRule {
    /// Named deterministic predicate, e.g. `due_date_in_future`,
    /// `has_source_spans`, `description_min_words:5`.
    pub rule: String,
    pub severity: RuleSeverity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryRequirements {
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Default values merged into `enriched_fields` during normalization.
    /// Existing keys are never overwritten.
    #[serde(default)]
    pub defaults: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}
