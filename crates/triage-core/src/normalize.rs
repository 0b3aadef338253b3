use crate::model::{DraftTask, NormalizedTask};
use crate::snapshot::GroundingSnapshot;
use chrono::Duration;
use std::collections::BTreeMap;

/// Deterministic enrichment of a resolved draft. Derived-field computation
/// only; no resolution decisions happen here. Reproducible from
/// `(task, snapshot)` alone: the reference clock is the snapshot capture time.
pub fn enrich(task: DraftTask, snapshot: &GroundingSnapshot) -> NormalizedTask {
    let mut task = task;
    let mut enriched_fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    // Fill a missing due date from the category SLA.
    if task.due_date.is_none() {
        if let Some(category_id) = task.category_id {
            if let Some(sla) = snapshot.sla_for(category_id) {
                let offset = Duration::milliseconds((sla.sla_hours * 3_600_000.0) as i64);
                task.due_date = Some(snapshot.captured_at + offset);
            }
        }
    }

    if let Some(due) = task.due_date {
        enriched_fields.insert(
            "expected_completion_date".to_string(),
            serde_json::Value::String(due.to_rfc3339()),
        );
    }

    // Category defaults declared by the pinned policy. Existing keys win.
    if let Some(category) = task.category_id.and_then(|id| snapshot.category(id)) {
        if let Some(reqs) = snapshot.policy.category_requirements.get(&category.name) {
            for (key, value) in &reqs.defaults {
                enriched_fields
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }

    NormalizedTask {
        draft: task,
        enriched_fields,
    }
}
