use crate::model::{NormalizedTask, QaMetadata, RejectionCategory};
use crate::policy::RuleSeverity;
use crate::snapshot::GroundingSnapshot;

/// Terminal outcome of the QA gate. Rejection is a controlled result, not an
/// error: the run ends with status `rejected` and nothing is persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum QaOutcome {
    Accept,
    Reject {
        reason: String,
        category: RejectionCategory,
    },
}

/// Evaluate a normalized task against the pinned policy. Rules run in a fixed
/// order and the first failure determines the category; rules are never
/// aggregated, so a rejection always has exactly one unambiguous cause.
pub fn evaluate(
    task: &NormalizedTask,
    qa: &QaMetadata,
    snapshot: &GroundingSnapshot,
) -> QaOutcome {
    let policy = &snapshot.policy;

    // 1. Critical fields present and non-empty.
    for field in &policy.qa.critical_fields {
        if !field_present(task, field) {
            return QaOutcome::Reject {
                reason: format!("critical field '{field}' is missing or empty"),
                category: RejectionCategory::MissingData,
            };
        }
    }

    // 2. Category requirements: the category row's own flags, then the
    // policy's per-category required field list.
    let category = task.draft.category_id.and_then(|id| snapshot.category(id));
    let category_reqs =
        category.and_then(|c| policy.category_requirements.get(&c.name));
    if let Some(category) = category {
        let mut required: Vec<&str> = Vec::new();
        if category.requires_patient {
            required.push("patient_id");
        }
        if category.requires_participant {
            required.push("participant_id");
        }
        if category.requires_due_date {
            required.push("due_date");
        }
        if let Some(reqs) = category_reqs {
            required.extend(reqs.required_fields.iter().map(String::as_str));
        }
        for field in required {
            if !field_present(task, field) {
                return QaOutcome::Reject {
                    reason: format!(
                        "category '{}' requires field '{}'",
                        category.name, field
                    ),
                    category: RejectionCategory::MissingData,
                };
            }
        }
    }

    // 3. Reference validity: the resolver's anti-hallucination counter.
    // Required fields that ended up null were already caught by rules 1-2;
    // this rule bounds how many hallucinated references of any kind a task
    // may carry before it is considered invalid.
    if policy.qa.reject_on_invalid_ids && qa.nullified_ids > policy.qa.max_null_required_fields {
        return QaOutcome::Reject {
            reason: format!(
                "{} extracted reference(s) could not be grounded in the snapshot",
                qa.nullified_ids
            ),
            category: RejectionCategory::InvalidData,
        };
    }

    // 4. Confidence thresholds.
    let confidence = task.draft.confidence;
    let ambiguity = 1.0 - confidence;
    if confidence < policy.extraction.required_confidence
        || ambiguity >= policy.extraction.ambiguity_threshold
    {
        return QaOutcome::Reject {
            reason: format!(
                "extraction confidence {confidence:.2} does not meet the \
                 policy thresholds"
            ),
            category: RejectionCategory::InsufficientQuality,
        };
    }

    // 5. Remaining category validation rules of critical severity.
    if let Some(reqs) = category_reqs {
        for rule in &reqs.validation_rules {
            if rule.severity == RuleSeverity::Critical && !rule_holds(&rule.rule, task, snapshot) {
                return QaOutcome::Reject {
                    reason: format!("validation rule '{}' failed", rule.rule),
                    category: RejectionCategory::PolicyViolation,
                };
            }
        }
    }

    QaOutcome::Accept
}

fn field_present(task: &NormalizedTask, field: &str) -> bool {
    match field {
        "description" => !task.draft.description.trim().is_empty(),
        "participant_id" => task.draft.participant_id.is_some(),
        "patient_id" => task.draft.patient_id.is_some(),
        "category_id" => task.draft.category_id.is_some(),
        "due_date" => task.draft.due_date.is_some(),
        "confidence" => true,
        "source_spans" => !task.draft.source_spans.is_empty(),
        other => task
            .enriched_fields
            .get(other)
            .map(|v| !v.is_null())
            .unwrap_or(false),
    }
}

/// Named deterministic predicates a policy may reference in
/// `validation_rules`. Unknown rule names pass; a policy targeting a newer
/// engine must not brick older deployments.
fn rule_holds(rule: &str, task: &NormalizedTask, snapshot: &GroundingSnapshot) -> bool {
    if let Some(min) = rule.strip_prefix("description_min_words:") {
        let min: usize = min.parse().unwrap_or(0);
        return task.draft.description.split_whitespace().count() >= min;
    }
    match rule {
        "due_date_in_future" => task
            .draft
            .due_date
            .map(|d| d >= snapshot.captured_at)
            .unwrap_or(true),
        "has_source_spans" => !task.draft.source_spans.is_empty(),
        _ => true,
    }
}
