use crate::model::{NormalizedTask, PriorityLevel, ScoreTerm};
use crate::snapshot::GroundingSnapshot;

const GROUP_URGENCY: &str = "urgency";
const GROUP_CATEGORY: &str = "category";
const GROUP_ACUITY: &str = "acuity";
const GROUP_SLA: &str = "sla";
const GROUP_COMPLEXITY: &str = "complexity";

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub score: f64,
    pub level: PriorityLevel,
    pub breakdown: Vec<ScoreTerm>,
}

/// Pure priority scorer. Inputs are the normalized task and the snapshot;
/// every weight term is looked up by (group, name) from the snapshot's
/// priority weights, so behavior changes purely with data. The breakdown
/// records each contributing term in evaluation order.
pub fn score(task: &NormalizedTask, snapshot: &GroundingSnapshot) -> Scored {
    let rules = &snapshot.policy.prioritization;
    let mut breakdown = Vec::new();
    let mut total = rules.base_score;
    breakdown.push(ScoreTerm {
        name: "base".to_string(),
        value: rules.base_score,
    });

    // Urgency keywords: every weight name in the urgency group is a keyword;
    // case-insensitive containment in the description adds its weight.
    let description = task.draft.description.to_lowercase();
    for (keyword, weight) in snapshot.weights_in_group(GROUP_URGENCY) {
        if description.contains(&keyword.to_lowercase()) {
            total += weight;
            breakdown.push(ScoreTerm {
                name: format!("urgency:{keyword}"),
                value: weight,
            });
        }
    }

    // Category weight by category name.
    if let Some(category) = task.draft.category_id.and_then(|id| snapshot.category(id)) {
        let weight = snapshot.weight(GROUP_CATEGORY, &category.name);
        if weight != 0.0 {
            total += weight;
            breakdown.push(ScoreTerm {
                name: format!("category:{}", category.name),
                value: weight,
            });
        }
    }

    // Acuity: the larger of the patient's applicable severity weights.
    if let Some(patient) = task.draft.patient_id.and_then(|id| snapshot.patient(id)) {
        let mut acuity = 0.0_f64;
        if patient.high_acuity {
            acuity = acuity.max(snapshot.weight(GROUP_ACUITY, "high_acuity"));
        }
        if patient.critical_status {
            acuity = acuity.max(snapshot.weight(GROUP_ACUITY, "critical_status"));
        }
        if acuity != 0.0 {
            total += acuity;
            breakdown.push(ScoreTerm {
                name: "acuity".to_string(),
                value: acuity,
            });
        }
    }

    // SLA near-breach bucket: remaining time relative to the category SLA,
    // measured from the snapshot capture instant.
    if let (Some(due), Some(sla)) = (
        task.draft.due_date,
        task.draft.category_id.and_then(|id| snapshot.sla_for(id)),
    ) {
        let total_ms = sla.sla_hours * 3_600_000.0;
        if total_ms > 0.0 {
            let remaining_ms = (due - snapshot.captured_at).num_milliseconds() as f64;
            let fraction = remaining_ms / total_ms;
            let (name, weight) = if fraction < 0.25 {
                ("sla:under_25", snapshot.weight(GROUP_SLA, "sla_25"))
            } else if fraction < 0.50 {
                ("sla:under_50", snapshot.weight(GROUP_SLA, "sla_50"))
            } else {
                ("", 0.0)
            };
            if weight != 0.0 {
                total += weight;
                breakdown.push(ScoreTerm {
                    name: name.to_string(),
                    value: weight,
                });
            }
        }
    }

    // Complexity: policy-declared keywords flag a task as complex (weight is
    // expected to be negative in data); everything else is routine.
    let complex = rules
        .complex_keywords
        .iter()
        .any(|k| description.contains(&k.to_lowercase()));
    let complexity_name = if complex { "complex" } else { "routine" };
    let complexity = snapshot.weight(GROUP_COMPLEXITY, complexity_name);
    if complexity != 0.0 {
        total += complexity;
        breakdown.push(ScoreTerm {
            name: format!("complexity:{complexity_name}"),
            value: complexity,
        });
    }

    let score = total.clamp(0.0, 100.0);
    Scored {
        score,
        level: level_for(score, snapshot),
        breakdown,
    }
}

/// Highest named threshold not exceeding the score. A score equal to a
/// threshold takes that level, so boundaries resolve upward (80.0 is
/// critical, 79.99 is high).
fn level_for(score: f64, snapshot: &GroundingSnapshot) -> PriorityLevel {
    let mut best: Option<(f64, PriorityLevel)> = None;
    for (name, threshold) in &snapshot.policy.prioritization.priority_thresholds {
        let Some(level) = PriorityLevel::from_threshold_name(name) else {
            continue;
        };
        if score >= *threshold {
            match best {
                Some((t, _)) if t >= *threshold => {}
                _ => best = Some((*threshold, level)),
            }
        }
    }
    best.map(|(_, l)| l).unwrap_or(PriorityLevel::Minimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, CategorySla, DraftTask, Patient, PriorityWeight};
    use crate::policy::Policy;
    use crate::snapshot::{PolicyRow, ReferenceData};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn weight(group: &str, name: &str, value: f64) -> PriorityWeight {
        PriorityWeight {
            name: name.into(),
            group: group.into(),
            value,
        }
    }

    fn snapshot() -> GroundingSnapshot {
        let mut policy = Policy::default();
        policy.prioritization.complex_keywords = vec!["multidisciplinary".into()];
        let reference = ReferenceData {
            patients: vec![
                Patient {
                    id: 20,
                    name: "Maria Garcia".into(),
                    mrn: "MRN005678".into(),
                    high_acuity: true,
                    critical_status: true,
                    active: true,
                },
                Patient {
                    id: 21,
                    name: "Robert Lee".into(),
                    mrn: "MRN002211".into(),
                    high_acuity: true,
                    critical_status: false,
                    active: true,
                },
            ],
            categories: vec![Category {
                id: 3,
                name: "medication_review".into(),
                requires_patient: true,
                requires_participant: false,
                requires_due_date: true,
                active: true,
            }],
            slas: vec![CategorySla {
                category_id: 3,
                sla_hours: 24.0,
                escalation_hours: None,
            }],
            weights: vec![
                weight("urgency", "asap", 15.0),
                weight("urgency", "urgent", 10.0),
                weight("category", "medication_review", 12.0),
                weight("acuity", "high_acuity", 8.0),
                weight("acuity", "critical_status", 20.0),
                weight("sla", "sla_25", 10.0),
                weight("sla", "sla_50", 5.0),
                weight("complexity", "routine", 2.0),
                weight("complexity", "complex", -5.0),
            ],
            policies: vec![PolicyRow {
                version: "v1".into(),
                active: true,
                document: policy,
            }],
            ..Default::default()
        };
        let captured = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        GroundingSnapshot::build(reference, captured).unwrap()
    }

    fn task(description: &str) -> NormalizedTask {
        NormalizedTask {
            draft: DraftTask {
                description: description.into(),
                participant_id: None,
                patient_id: None,
                category_id: None,
                due_date: None,
                confidence: 0.9,
                source_spans: vec![],
            },
            enriched_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn base_score_alone_for_plain_task() {
        let snapshot = snapshot();
        let scored = score(&task("File the weekly census paperwork"), &snapshot);
        // base 50 + routine 2
        assert_eq!(scored.score, 52.0);
        assert_eq!(scored.level, PriorityLevel::Medium);
        assert_eq!(scored.breakdown[0].name, "base");
    }

    #[test]
    fn urgency_category_acuity_and_sla_stack() {
        let snapshot = snapshot();
        let mut t = task("Review Robert Lee's medications ASAP");
        t.draft.patient_id = Some(21);
        t.draft.category_id = Some(3);
        // Due in 2 of 24 SLA hours: well under the 25% bucket.
        t.draft.due_date = Some(snapshot.captured_at + Duration::hours(2));
        let scored = score(&t, &snapshot);
        // base 50 + asap 15 + category 12 + high_acuity 8 + sla_25 10 + routine 2
        assert_eq!(scored.score, 97.0);
        assert_eq!(scored.level, PriorityLevel::Critical);
        let names: Vec<_> = scored.breakdown.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "base",
                "urgency:asap",
                "category:medication_review",
                "acuity",
                "sla:under_25",
                "complexity:routine"
            ]
        );
    }

    #[test]
    fn urgency_match_is_case_insensitive() {
        let snapshot = snapshot();
        let scored = score(&task("please handle this Urgent item"), &snapshot);
        assert!(scored
            .breakdown
            .iter()
            .any(|t| t.name == "urgency:urgent" && t.value == 10.0));
    }

    #[test]
    fn acuity_takes_the_maximum_weight() {
        let snapshot = snapshot();
        let mut t = task("check vitals");
        t.draft.patient_id = Some(20);
        let scored = score(&t, &snapshot);
        let acuity = scored.breakdown.iter().find(|t| t.name == "acuity").unwrap();
        assert_eq!(acuity.value, 20.0);
    }

    #[test]
    fn sla_buckets_select_by_remaining_fraction() {
        let snapshot = snapshot();
        let mut t = task("plain follow up");
        t.draft.category_id = Some(3);

        t.draft.due_date = Some(snapshot.captured_at + Duration::hours(10));
        let scored = score(&t, &snapshot);
        assert!(scored.breakdown.iter().any(|x| x.name == "sla:under_50"));

        t.draft.due_date = Some(snapshot.captured_at + Duration::hours(20));
        let scored = score(&t, &snapshot);
        assert!(!scored.breakdown.iter().any(|x| x.name.starts_with("sla:")));

        // Already past due counts as under 25% remaining.
        t.draft.due_date = Some(snapshot.captured_at - Duration::hours(1));
        let scored = score(&t, &snapshot);
        assert!(scored.breakdown.iter().any(|x| x.name == "sla:under_25"));
    }

    #[test]
    fn complex_keyword_applies_negative_weight() {
        let snapshot = snapshot();
        let scored = score(&task("multidisciplinary care plan meeting"), &snapshot);
        assert_eq!(scored.score, 45.0);
        assert!(scored
            .breakdown
            .iter()
            .any(|t| t.name == "complexity:complex" && t.value == -5.0));
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        let snapshot = snapshot();
        let mut t = task("asap urgent asap multidisciplinary");
        t.draft.patient_id = Some(20);
        t.draft.category_id = Some(3);
        let scored = score(&t, &snapshot);
        assert!((0.0..=100.0).contains(&scored.score));
    }

    #[test]
    fn threshold_boundary_resolves_to_higher_level() {
        let snapshot = snapshot();
        assert_eq!(level_for(80.0, &snapshot), PriorityLevel::Critical);
        assert_eq!(level_for(79.99, &snapshot), PriorityLevel::High);
        assert_eq!(level_for(60.0, &snapshot), PriorityLevel::High);
        assert_eq!(level_for(40.0, &snapshot), PriorityLevel::Medium);
        assert_eq!(level_for(20.0, &snapshot), PriorityLevel::Low);
        assert_eq!(level_for(19.9, &snapshot), PriorityLevel::Minimal);
    }

    #[test]
    fn scoring_is_deterministic() {
        let snapshot = snapshot();
        let mut t = task("Review Maria Garcia's medications ASAP");
        t.draft.patient_id = Some(20);
        t.draft.category_id = Some(3);
        let a = score(&t, &snapshot);
        let b = score(&t, &snapshot);
        assert_eq!(a, b);
    }
}
