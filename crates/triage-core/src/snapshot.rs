use crate::model::{Category, CategorySla, Participant, Patient, PriorityWeight, RefId};
use crate::policy::Policy;
use crate::time::EpochMs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Raw reference rows as the store returns them, active flags included.
/// The snapshot builder filters and indexes these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    pub participants: Vec<Participant>,
    pub patients: Vec<Patient>,
    pub categories: Vec<Category>,
    pub slas: Vec<CategorySla>,
    pub weights: Vec<PriorityWeight>,
    pub policies: Vec<PolicyRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRow {
    pub version: String,
    pub active: bool,
    pub document: Policy,
}

#[derive(Debug, Error)]
pub enum GroundingError {
    #[error("reference store unavailable: {0}")]
    Store(String),
    #[error("expected exactly one active policy, found {0}")]
    AmbiguousPolicy(usize),
}

/// Immutable point-in-time view of reference data for one pipeline run.
/// Built once at run start and never refreshed, so all resolution and
/// scoring within a run see the same rows even if the store changes
/// concurrently.
#[derive(Debug, Clone)]
pub struct GroundingSnapshot {
    pub captured_at: DateTime<Utc>,
    participants: BTreeMap<RefId, Participant>,
    patients: BTreeMap<RefId, Patient>,
    categories: BTreeMap<RefId, Category>,
    slas: BTreeMap<RefId, CategorySla>,
    weights: BTreeMap<(String, String), f64>,
    pub policy_version: String,
    pub policy: Policy,
}

impl GroundingSnapshot {
    /// Index active rows and pin the single active policy. An active policy
    /// count other than one is a configuration error, not a runtime one.
    pub fn build(
        reference: ReferenceData,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, GroundingError> {
        let mut active_policies: Vec<PolicyRow> = reference
            .policies
            .into_iter()
            .filter(|p| p.active)
            .collect();
        if active_policies.len() != 1 {
            return Err(GroundingError::AmbiguousPolicy(active_policies.len()));
        }
        let policy_row = active_policies.remove(0);

        let participants = reference
            .participants
            .into_iter()
            .filter(|p| p.active)
            .map(|p| (p.id, p))
            .collect();
        let patients = reference
            .patients
            .into_iter()
            .filter(|p| p.active)
            .map(|p| (p.id, p))
            .collect();
        let categories = reference
            .categories
            .into_iter()
            .filter(|c| c.active)
            .map(|c| (c.id, c))
            .collect();
        let slas = reference
            .slas
            .into_iter()
            .map(|s| (s.category_id, s))
            .collect();
        let weights = reference
            .weights
            .into_iter()
            .map(|w| ((w.group, w.name), w.value))
            .collect();

        Ok(Self {
            captured_at,
            participants,
            patients,
            categories,
            slas,
            weights,
            policy_version: policy_row.version,
            policy: policy_row.document,
        })
    }

    pub fn captured_ms(&self) -> EpochMs {
        self.captured_at.timestamp_millis()
    }

    pub fn participant(&self, id: RefId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn patient(&self, id: RefId) -> Option<&Patient> {
        self.patients.get(&id)
    }

    pub fn category(&self, id: RefId) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn sla_for(&self, category_id: RefId) -> Option<&CategorySla> {
        self.slas.get(&category_id)
    }

    /// Weight lookup by (group, name). Absent weights contribute nothing.
    pub fn weight(&self, group: &str, name: &str) -> f64 {
        self.weights
            .get(&(group.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// All weights in a group, in stable name order.
    pub fn weights_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.weights
            .iter()
            .filter(move |((g, _), _)| g == group)
            .map(|((_, name), value)| (name.as_str(), *value))
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn patients(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }
}
