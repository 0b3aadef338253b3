use crate::time::EpochMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Resolution,
    Normalization,
    Qa,
    Prioritization,
}

impl Stage {
    /// Version of the stage logic recorded alongside each lineage entry.
    pub fn version(&self) -> &'static str {
        "1.0.0"
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Resolution => "resolution",
            Self::Normalization => "normalization",
            Self::Qa => "qa",
            Self::Prioritization => "prioritization",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineageEntry {
    pub stage: Stage,
    pub stage_version: String,
    pub policy_version: String,
    pub timestamp_ms: EpochMs,
}

/// Append-only audit trail. Wrapped in a struct so the persisted JSON carries
/// the `processing_chain` key the task record exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineageMetadata {
    pub processing_chain: Vec<LineageEntry>,
}

impl LineageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry for `stage`. Timestamps are strictly increasing: a
    /// clock value at or before the previous entry is bumped past it.
    pub fn append(&mut self, stage: Stage, policy_version: &str, clock_ms: EpochMs) {
        let timestamp_ms = match self.processing_chain.last() {
            Some(prev) if clock_ms <= prev.timestamp_ms => prev.timestamp_ms + 1,
            _ => clock_ms,
        };
        self.processing_chain.push(LineageEntry {
            stage,
            stage_version: stage.version().to_string(),
            policy_version: policy_version.to_string(),
            timestamp_ms,
        });
    }

    pub fn len(&self) -> usize {
        self.processing_chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processing_chain.is_empty()
    }
}
