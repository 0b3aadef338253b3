use serde::Serialize;
use triage_core::{GroundingSnapshot, RefId};

/// The slice of reference data handed to the model so it can resolve names
/// to ids. Only id, name and requirement material goes over the wire;
/// acuity flags, SLA hours and weights stay server-side.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractionContext {
    pub participants: Vec<NamedRef>,
    pub patients: Vec<NamedRef>,
    pub categories: Vec<CategoryRef>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NamedRef {
    pub id: RefId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryRef {
    pub id: RefId,
    pub name: String,
    /// Field names the pinned policy requires for tasks in this category.
    pub required_fields: Vec<String>,
}

impl ExtractionContext {
    pub fn from_snapshot(snapshot: &GroundingSnapshot) -> Self {
        Self {
            participants: snapshot
                .participants()
                .map(|p| NamedRef {
                    id: p.id,
                    name: p.name.clone(),
                })
                .collect(),
            patients: snapshot
                .patients()
                .map(|p| NamedRef {
                    id: p.id,
                    name: p.name.clone(),
                })
                .collect(),
            categories: snapshot
                .categories()
                .map(|c| {
                    let mut required_fields = Vec::new();
                    if c.requires_patient {
                        required_fields.push("patient_id".to_string());
                    }
                    if c.requires_participant {
                        required_fields.push("participant_id".to_string());
                    }
                    if c.requires_due_date {
                        required_fields.push("due_date".to_string());
                    }
                    if let Some(reqs) = snapshot.policy.category_requirements.get(&c.name) {
                        for field in &reqs.required_fields {
                            if !required_fields.contains(field) {
                                required_fields.push(field.clone());
                            }
                        }
                    }
                    CategoryRef {
                        id: c.id,
                        name: c.name.clone(),
                        required_fields,
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{Category, Participant, Patient, Policy, PolicyRow, ReferenceData};

    #[test]
    fn context_carries_active_rows_only() {
        let reference = ReferenceData {
            participants: vec![Participant {
                id: 10,
                name: "Dr. Chen".into(),
                role: "physician".into(),
                active: true,
            }],
            patients: vec![
                Patient {
                    id: 20,
                    name: "Maria Garcia".into(),
                    mrn: "MRN005678".into(),
                    high_acuity: false,
                    critical_status: false,
                    active: true,
                },
                Patient {
                    id: 21,
                    name: "Former Patient".into(),
                    mrn: "MRN000001".into(),
                    high_acuity: false,
                    critical_status: false,
                    active: false,
                },
            ],
            categories: vec![Category {
                id: 3,
                name: "lab_order".into(),
                requires_patient: true,
                requires_participant: false,
                requires_due_date: false,
                active: true,
            }],
            policies: vec![PolicyRow {
                version: "v1".into(),
                active: true,
                document: Policy::default(),
            }],
            ..Default::default()
        };
        let snapshot = GroundingSnapshot::build(reference, Utc::now()).unwrap();
        let context = ExtractionContext::from_snapshot(&snapshot);
        assert_eq!(context.participants.len(), 1);
        assert_eq!(context.patients.len(), 1);
        assert_eq!(context.patients[0].name, "Maria Garcia");
        assert_eq!(context.categories[0].id, 3);
        assert_eq!(context.categories[0].required_fields, vec!["patient_id"]);
    }
}
