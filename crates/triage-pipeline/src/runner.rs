use crate::cancel::CancellationToken;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use triage_core::{
    enrich, evaluate, parse_draft, resolve_references, score, EpochMs, FinalTask, GroundingError,
    GroundingSnapshot, LineageMetadata, QaOutcome, RejectionCategory, RunStatus, SchemaError,
    Stage,
};
use triage_extract::{ExtractError, ExtractionContext, Extractor};
use triage_storage::{StorageError, TaskId, TaskStore};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("grounding failed: {0}")]
    Grounding(#[from] GroundingError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    #[error("extraction output failed schema validation: {0}")]
    Schema(#[from] SchemaError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),
    #[error("run cancelled before persistence")]
    Cancelled,
}

/// How a run ended when the pipeline itself did not fail. Rejection by the
/// QA gate is a first-class outcome, not an error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { task_id: TaskId, task: FinalTask },
    Rejected {
        reason: String,
        category: RejectionCategory,
    },
}

/// Run bookkeeping threaded through the stages. Each transition consumes
/// the previous state and returns a new one; transitions are
/// one-directional and every executed stage leaves a lineage entry.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub status: RunStatus,
    pub lineage: LineageMetadata,
}

impl PipelineState {
    fn new() -> Self {
        Self {
            status: RunStatus::Pending,
            lineage: LineageMetadata::new(),
        }
    }

    fn advance(
        mut self,
        status: RunStatus,
        stage: Stage,
        policy_version: &str,
        clock_ms: EpochMs,
    ) -> Self {
        self.lineage.append(stage, policy_version, clock_ms);
        self.status = status;
        debug!(status = status.as_str(), stage = stage.as_str(), "stage complete");
        self
    }
}

/// Drives one transcript through every stage. Stateless between runs: each
/// run builds its own snapshot and owns its task until the single insert.
pub struct PipelineRunner<E, S> {
    extractor: E,
    store: S,
}

impl<E: Extractor, S: TaskStore> PipelineRunner<E, S> {
    pub fn new(extractor: E, store: S) -> Self {
        Self { extractor, store }
    }

    pub async fn run(
        &self,
        transcript: &str,
        transcript_id: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        self.run_at(transcript, transcript_id, Utc::now(), cancel)
            .await
    }

    /// Same as [`run`](Self::run) with an explicit capture instant. Given
    /// identical transcript, reference data and extraction output, two runs
    /// with the same instant produce identical final tasks.
    pub async fn run_at(
        &self,
        transcript: &str,
        transcript_id: Option<i64>,
        captured_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let reference = self
            .store
            .load_reference()
            .map_err(|e| GroundingError::Store(e.to_string()))?;
        let snapshot = GroundingSnapshot::build(reference, captured_at)?;
        info!(
            policy_version = %snapshot.policy_version,
            captured_at = %snapshot.captured_at,
            "snapshot pinned"
        );

        // All lineage timestamps derive from the snapshot instant, one tick
        // per stage, so reruns of the same snapshot are bit-identical.
        let clock = snapshot.captured_ms();
        let version = snapshot.policy_version.clone();
        let state = PipelineState::new();

        let context = ExtractionContext::from_snapshot(&snapshot);
        let payload = self.extractor.extract(transcript, &context).await?;
        let state = state.advance(RunStatus::Extracted, Stage::Extraction, &version, clock);

        let draft = parse_draft(&payload)?;

        let resolved = resolve_references(draft, &snapshot);
        let state = state.advance(RunStatus::Resolved, Stage::Resolution, &version, clock + 1);
        if resolved.qa.nullified_ids > 0 {
            warn!(
                nullified = resolved.qa.nullified_ids,
                fields = ?resolved.qa.nullified_fields,
                "nullified unresolvable references"
            );
        }
        let mut qa_metadata = resolved.qa;

        let normalized = enrich(resolved.task, &snapshot);
        let state = state.advance(
            RunStatus::Normalized,
            Stage::Normalization,
            &version,
            clock + 2,
        );

        match evaluate(&normalized, &qa_metadata, &snapshot) {
            QaOutcome::Reject { reason, category } => {
                let state = state.advance(RunStatus::Rejected, Stage::Qa, &version, clock + 3);
                info!(
                    status = state.status.as_str(),
                    category = category.as_str(),
                    %reason,
                    "rejected by qa gate"
                );
                return Ok(RunOutcome::Rejected { reason, category });
            }
            QaOutcome::Accept => {
                qa_metadata.decision = Some("accepted".to_string());
            }
        }
        let state = state.advance(RunStatus::Accepted, Stage::Qa, &version, clock + 3);

        let scored = score(&normalized, &snapshot);
        let state = state.advance(
            RunStatus::Accepted,
            Stage::Prioritization,
            &version,
            clock + 4,
        );
        debug!(score = scored.score, level = scored.level.as_str(), "scored");

        let task = FinalTask {
            task: normalized,
            priority_score: scored.score,
            priority_level: scored.level,
            score_breakdown: scored.breakdown,
            lineage_metadata: state.lineage,
            qa_metadata,
        };

        if cancel.is_cancelled() {
            info!("cancelled before persistence, nothing written");
            return Err(PipelineError::Cancelled);
        }

        let task_id = self.store.insert_task(&task, transcript_id)?;
        info!(task_id, status = RunStatus::Completed.as_str(), "task persisted");
        Ok(RunOutcome::Completed { task_id, task })
    }
}
