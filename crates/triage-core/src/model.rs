use crate::lineage::LineageMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Database identifier for reference rows (participants, patients, categories).
pub type RefId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: RefId,
    pub name: String,
    pub role: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: RefId,
    pub name: String,
    /// Medical record number, the external unique patient identifier.
    pub mrn: String,
    pub high_acuity: bool,
    pub critical_status: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: RefId,
    pub name: String,
    pub requires_patient: bool,
    pub requires_participant: bool,
    pub requires_due_date: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySla {
    pub category_id: RefId,
    pub sla_hours: f64,
    pub escalation_hours: Option<f64>,
}

/// A single named scoring weight. Group + name form the lookup key, e.g.
/// (`urgency`, `asap`), (`category`, `medication_review`), (`acuity`,
/// `high_acuity`), (`sla`, `sla_25`), (`complexity`, `routine`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityWeight {
    pub name: String,
    pub group: String,
    pub value: f64,
}

/// Character-offset provenance in the source transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Candidate task as returned by the extraction capability, after the
/// structural contract check. Id fields are either snapshot references or
/// null, never a dangling id once resolution has run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftTask {
    pub description: String,
    pub participant_id: Option<RefId>,
    pub patient_id: Option<RefId>,
    pub category_id: Option<RefId>,
    pub due_date: Option<DateTime<Utc>>,
    pub confidence: f64,
    #[serde(default)]
    pub source_spans: Vec<SourceSpan>,
}

/// Draft plus deterministic enrichment (derived fields only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedTask {
    #[serde(flatten)]
    pub draft: DraftTask,
    #[serde(default)]
    pub enriched_fields: BTreeMap<String, serde_json::Value>,
}

/// Anti-hallucination bookkeeping produced by reference resolution and
/// consulted by the QA gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaMetadata {
    /// How many non-null id fields failed snapshot lookup and were nullified.
    pub nullified_ids: u32,
    /// Which id fields were nullified, in resolution order.
    pub nullified_fields: Vec<String>,
    /// Gate decision recorded on persisted tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

/// One contributing term of the priority score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreTerm {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl PriorityLevel {
    pub fn from_threshold_name(name: &str) -> Option<Self> {
        match name {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Minimal => "minimal",
        }
    }
}

/// Fully scored, QA-accepted task. Owned by the pipeline until persisted;
/// afterwards the pipeline holds only the returned row id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalTask {
    #[serde(flatten)]
    pub task: NormalizedTask,
    pub priority_score: f64,
    pub priority_level: PriorityLevel,
    pub score_breakdown: Vec<ScoreTerm>,
    pub lineage_metadata: LineageMetadata,
    pub qa_metadata: QaMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Extracted,
    Resolved,
    Normalized,
    Accepted,
    Rejected,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Resolved => "resolved",
            Self::Normalized => "normalized",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCategory {
    MissingData,
    InvalidData,
    PolicyViolation,
    InsufficientQuality,
}

impl RejectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingData => "missing_data",
            Self::InvalidData => "invalid_data",
            Self::PolicyViolation => "policy_violation",
            Self::InsufficientQuality => "insufficient_quality",
        }
    }
}
