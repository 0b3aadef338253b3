use crate::model::{DraftTask, QaMetadata, RefId, SourceSpan};
use crate::snapshot::GroundingSnapshot;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Structural contract failures. Fatal for the run: the pipeline aborts
/// before QA with no partial save.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("draft payload is not a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),
    #[error("description must be a non-empty string")]
    EmptyDescription,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("source span {start}..{end} is not a valid range")]
    BadSpan { start: usize, end: usize },
    #[error("field '{field}' is not a valid RFC 3339 timestamp: {value}")]
    BadTimestamp { field: &'static str, value: String },
}

/// Check the draft payload against the structural contract and parse it.
/// The extraction boundary is untrusted input; this is explicit key/type/range
/// checking, not a blind deserialize.
pub fn parse_draft(payload: &Value) -> Result<DraftTask, SchemaError> {
    let obj = payload.as_object().ok_or(SchemaError::NotAnObject)?;

    let description = match obj.get("description") {
        None | Some(Value::Null) => return Err(SchemaError::MissingField("description")),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(SchemaError::WrongType("description")),
    };
    if description.is_empty() {
        return Err(SchemaError::EmptyDescription);
    }

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => return Err(SchemaError::MissingField("confidence")),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or(SchemaError::WrongType("confidence"))?,
        Some(_) => return Err(SchemaError::WrongType("confidence")),
    };
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SchemaError::ConfidenceOutOfRange(confidence));
    }

    let participant_id = optional_id(obj.get("participant_id"), "participant_id")?;
    let patient_id = optional_id(obj.get("patient_id"), "patient_id")?;
    let category_id = optional_id(obj.get("category_id"), "category_id")?;
    let due_date = optional_timestamp(obj.get("due_date"), "due_date")?;
    let source_spans = parse_spans(obj.get("source_spans"))?;

    Ok(DraftTask {
        description,
        participant_id,
        patient_id,
        category_id,
        due_date,
        confidence,
        source_spans,
    })
}

fn optional_id(value: Option<&Value>, field: &'static str) -> Result<Option<RefId>, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or(SchemaError::WrongType(field)),
        Some(_) => Err(SchemaError::WrongType(field)),
    }
}

fn optional_timestamp(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| SchemaError::BadTimestamp {
                field,
                value: s.clone(),
            }),
        Some(_) => Err(SchemaError::WrongType(field)),
    }
}

fn parse_spans(value: Option<&Value>) -> Result<Vec<SourceSpan>, SchemaError> {
    let arr = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(a)) => a,
        Some(_) => return Err(SchemaError::WrongType("source_spans")),
    };
    let mut spans = Vec::with_capacity(arr.len());
    for item in arr {
        let obj = item
            .as_object()
            .ok_or(SchemaError::WrongType("source_spans"))?;
        let start = obj
            .get("start")
            .and_then(Value::as_u64)
            .ok_or(SchemaError::WrongType("source_spans"))? as usize;
        let end = obj
            .get("end")
            .and_then(Value::as_u64)
            .ok_or(SchemaError::WrongType("source_spans"))? as usize;
        if end < start {
            return Err(SchemaError::BadSpan { start, end });
        }
        let field = match obj.get("field") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(SchemaError::WrongType("source_spans")),
        };
        spans.push(SourceSpan { start, end, field });
    }
    Ok(spans)
}

/// Result of grounding a draft against the snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedDraft {
    pub task: DraftTask,
    pub qa: QaMetadata,
}

/// Enforce database grounding: every non-null id must exist in the snapshot.
/// Ids that fail lookup are forcibly nullified and counted; the extraction
/// boundary's self-reported nulls are never trusted on their own.
pub fn resolve_references(mut task: DraftTask, snapshot: &GroundingSnapshot) -> ResolvedDraft {
    let mut qa = QaMetadata::default();

    if let Some(id) = task.participant_id {
        if snapshot.participant(id).is_none() {
            task.participant_id = None;
            nullify(&mut qa, "participant_id");
        }
    }
    if let Some(id) = task.patient_id {
        if snapshot.patient(id).is_none() {
            task.patient_id = None;
            nullify(&mut qa, "patient_id");
        }
    }
    if let Some(id) = task.category_id {
        if snapshot.category(id).is_none() {
            task.category_id = None;
            nullify(&mut qa, "category_id");
        }
    }

    ResolvedDraft { task, qa }
}

fn nullify(qa: &mut QaMetadata, field: &str) {
    qa.nullified_ids += 1;
    qa.nullified_fields.push(field.to_string());
}
