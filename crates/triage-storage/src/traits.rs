use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use triage_core::{FinalTask, ReferenceData};

/// Database identifier of a persisted task row.
pub type TaskId = i64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("insert failed: {0}")]
    Insert(String),
    #[error("query failed: {0}")]
    Query(String),
}

/// Aggregate counts exposed by the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_tasks: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
}

/// Persistence adapter consumed by the pipeline. The only mutation the
/// pipeline ever performs is `insert_task`, once per completed run, in a
/// single transaction.
pub trait TaskStore: Send + Sync {
    /// Read all reference tables, active flags included, with
    /// read-consistency (one transaction). The snapshot builder filters.
    fn load_reference(&self) -> Result<ReferenceData, StorageError>;

    /// Insert one task row and return its generated id. Transactional: on
    /// error nothing is written.
    fn insert_task(
        &self,
        task: &FinalTask,
        transcript_id: Option<i64>,
    ) -> Result<TaskId, StorageError>;

    fn stats(&self) -> Result<StoreStats, StorageError>;
}

impl<T: TaskStore + ?Sized> TaskStore for Arc<T> {
    fn load_reference(&self) -> Result<ReferenceData, StorageError> {
        (**self).load_reference()
    }

    fn insert_task(
        &self,
        task: &FinalTask,
        transcript_id: Option<i64>,
    ) -> Result<TaskId, StorageError> {
        (**self).insert_task(task, transcript_id)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        (**self).stats()
    }
}
