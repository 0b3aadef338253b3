use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use triage_core::{
    Category, CategoryRequirements, CategorySla, Participant, Patient, Policy, PolicyRow,
    PriorityLevel, PriorityWeight, ReferenceData, RejectionCategory, RuleSeverity, ValidationRule,
};
use triage_extract::{CannedExtractor, FailingExtractor};
use triage_pipeline::{CancellationToken, PipelineError, PipelineRunner, RunOutcome};
use triage_storage::MemoryStore;

fn policy() -> Policy {
    let mut policy = Policy::default();
    policy.qa.critical_fields = vec!["description".into()];
    policy.qa.reject_on_invalid_ids = true;
    policy.qa.max_null_required_fields = 0;
    policy.extraction.required_confidence = 0.6;
    policy.category_requirements.insert(
        "medication_review".into(),
        CategoryRequirements {
            required_fields: vec!["patient_id".into()],
            defaults: BTreeMap::from([("channel".into(), json!("pharmacy"))]),
            validation_rules: vec![ValidationRule {
                rule: "has_source_spans".into(),
                severity: RuleSeverity::Critical,
            }],
        },
    );
    policy
}

fn reference() -> ReferenceData {
    ReferenceData {
        participants: vec![Participant {
            id: 10,
            name: "Dr. Chen".into(),
            role: "physician".into(),
            active: true,
        }],
        patients: vec![Patient {
            id: 20,
            name: "Maria Garcia".into(),
            mrn: "MRN005678".into(),
            high_acuity: true,
            critical_status: false,
            active: true,
        }],
        categories: vec![
            Category {
                id: 3,
                name: "medication_review".into(),
                requires_patient: true,
                requires_participant: false,
                requires_due_date: true,
                active: true,
            },
            Category {
                id: 4,
                name: "follow_up".into(),
                requires_patient: false,
                requires_participant: false,
                requires_due_date: false,
                active: true,
            },
        ],
        slas: vec![CategorySla {
            category_id: 3,
            sla_hours: 24.0,
            escalation_hours: Some(48.0),
        }],
        weights: vec![
            PriorityWeight {
                group: "urgency".into(),
                name: "asap".into(),
                value: 15.0,
            },
            PriorityWeight {
                group: "category".into(),
                name: "medication_review".into(),
                value: 10.0,
            },
            PriorityWeight {
                group: "acuity".into(),
                name: "high_acuity".into(),
                value: 12.0,
            },
        ],
        policies: vec![PolicyRow {
            version: "2026-08-01".into(),
            active: true,
            document: policy(),
        }],
    }
}

fn valid_payload() -> serde_json::Value {
    json!({
        "description": "Review medications for Maria Garcia asap",
        "participant_id": 10,
        "patient_id": 20,
        "category_id": 3,
        "due_date": null,
        "confidence": 0.9,
        "source_spans": [{"start": 0, "end": 41}]
    })
}

fn captured() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn happy_path_persists_scored_task() {
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(valid_payload()), store.clone());

    let outcome = runner
        .run_at("Transcript: review meds for Maria asap.", Some(7), captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed { task_id, task } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(task_id, 1);
    assert_eq!(task.priority_score, 87.0);
    assert_eq!(task.priority_level, PriorityLevel::Critical);

    // Due date filled from the 24h SLA off the capture instant.
    let expected_due = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();
    assert_eq!(task.task.draft.due_date, Some(expected_due));
    assert_eq!(task.task.enriched_fields["channel"], json!("pharmacy"));

    // One lineage entry per stage, timestamps strictly increasing.
    let chain = &task.lineage_metadata.processing_chain;
    assert_eq!(chain.len(), 5);
    for pair in chain.windows(2) {
        assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
    }
    assert!(chain.iter().all(|e| e.policy_version == "2026-08-01"));
    assert_eq!(task.qa_metadata.decision.as_deref(), Some("accepted"));

    assert_eq!(store.task_count(), 1);
    assert_eq!(store.insert_calls(), 1);
}

#[tokio::test]
async fn hallucinated_required_reference_is_rejected_as_missing_data() {
    // Patient id 999 is not in the reference data; resolution nullifies it
    // and the category's required patient is then absent.
    let mut payload = valid_payload();
    payload["patient_id"] = json!(999);
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let outcome = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Rejected { category, reason } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(category, RejectionCategory::MissingData);
    assert!(reason.contains("patient_id"), "reason was: {reason}");
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn hallucinated_optional_reference_is_rejected_as_invalid_data() {
    // follow_up has no required fields, so the nullified participant id
    // survives to the anti-hallucination counter rule.
    let payload = json!({
        "description": "Schedule follow up call",
        "participant_id": 999,
        "patient_id": null,
        "category_id": 4,
        "confidence": 0.9,
        "source_spans": [{"start": 0, "end": 23}]
    });
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let outcome = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Rejected { category, .. } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(category, RejectionCategory::InvalidData);
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn low_confidence_is_rejected_as_insufficient_quality() {
    let mut payload = valid_payload();
    payload["confidence"] = json!(0.3);
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let outcome = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Rejected { category, .. } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(category, RejectionCategory::InsufficientQuality);
}

#[tokio::test]
async fn missing_source_spans_violates_critical_rule() {
    let mut payload = valid_payload();
    payload["source_spans"] = json!([]);
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let outcome = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Rejected { category, .. } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(category, RejectionCategory::PolicyViolation);
}

#[tokio::test]
async fn malformed_extraction_output_is_fatal() {
    let payload = json!({"confidence": 0.9});
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let err = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)));
    assert_eq!(store.task_count(), 0);
    assert_eq!(store.insert_calls(), 0);
}

#[tokio::test]
async fn extraction_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(FailingExtractor::status(503), store.clone());

    let err = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn unavailable_reference_store_is_a_grounding_failure() {
    let store = Arc::new(MemoryStore::new(reference()));
    store.set_reference_unavailable(true);
    let runner = PipelineRunner::new(CannedExtractor::single(valid_payload()), store.clone());

    let err = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Grounding(_)));
}

#[tokio::test]
async fn insert_failure_surfaces_and_writes_nothing() {
    let store = Arc::new(MemoryStore::new(reference()));
    store.fail_next_insert();
    let runner = PipelineRunner::new(CannedExtractor::single(valid_payload()), store.clone());

    let err = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));
    assert_eq!(store.insert_calls(), 1);
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn cancellation_before_persistence_writes_nothing() {
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(valid_payload()), store.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = runner
        .run_at("transcript text here", None, captured(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(store.insert_calls(), 0);
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn administrative_task_scores_the_baseline() {
    // No urgency keyword, no category weight, no patient acuity: the score
    // is the policy base and nothing else.
    let payload = json!({
        "description": "File the quarterly report",
        "participant_id": 10,
        "patient_id": null,
        "category_id": 4,
        "confidence": 0.8,
        "source_spans": [{"start": 0, "end": 25}]
    });
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(CannedExtractor::single(payload), store.clone());

    let outcome = runner
        .run_at("transcript text here", None, captured(), &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed { task, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(task.priority_score, 50.0);
    assert_eq!(task.priority_level, PriorityLevel::Medium);
    assert_eq!(task.score_breakdown.len(), 1);
    assert_eq!(task.score_breakdown[0].name, "base");
}

#[tokio::test]
async fn weight_updates_only_affect_later_runs() {
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(
        CannedExtractor::new(vec![valid_payload(), valid_payload()]),
        store.clone(),
    );
    let cancel = CancellationToken::new();

    let first = runner
        .run_at("transcript text here", None, captured(), &cancel)
        .await
        .unwrap();
    let RunOutcome::Completed { task: before, .. } = first else {
        panic!("expected completion");
    };
    assert_eq!(before.priority_score, 87.0);

    let mut updated = reference();
    for w in &mut updated.weights {
        if w.group == "urgency" && w.name == "asap" {
            w.value = 20.0;
        }
    }
    store.set_reference(updated);

    let second = runner
        .run_at("transcript text here", None, captured(), &cancel)
        .await
        .unwrap();
    let RunOutcome::Completed { task: after, .. } = second else {
        panic!("expected completion");
    };
    assert_eq!(after.priority_score, 92.0);
}

#[tokio::test]
async fn identical_runs_produce_identical_tasks() {
    let store = Arc::new(MemoryStore::new(reference()));
    let runner = PipelineRunner::new(
        CannedExtractor::new(vec![valid_payload(), valid_payload()]),
        store.clone(),
    );
    let cancel = CancellationToken::new();

    let first = runner
        .run_at("transcript text here", None, captured(), &cancel)
        .await
        .unwrap();
    let second = runner
        .run_at("transcript text here", None, captured(), &cancel)
        .await
        .unwrap();

    let (RunOutcome::Completed { task: a, .. }, RunOutcome::Completed { task: b, .. }) =
        (first, second)
    else {
        panic!("expected two completions");
    };
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
