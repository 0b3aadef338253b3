use crate::traits::{StorageError, StoreStats, TaskId, TaskStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use triage_core::{FinalTask, ReferenceData};

/// In-memory `TaskStore`. Backs pipeline tests; also useful for dry runs
/// without a database file.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    insert_calls: AtomicU64,
    fail_next_insert: AtomicBool,
    reference_unavailable: AtomicBool,
}

struct Inner {
    reference: ReferenceData,
    tasks: Vec<StoredTask>,
    next_id: TaskId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            reference: ReferenceData::default(),
            tasks: Vec::new(),
            next_id: 1,
        }
    }
}

struct StoredTask {
    id: TaskId,
    #[allow(dead_code)]
    transcript_id: Option<i64>,
    task: FinalTask,
}

impl MemoryStore {
    pub fn new(reference: ReferenceData) -> Self {
        Self {
            inner: Mutex::new(Inner {
                reference,
                tasks: Vec::new(),
                next_id: 1,
            }),
            ..Default::default()
        }
    }

    pub fn set_reference(&self, reference: ReferenceData) {
        self.inner.lock().unwrap().reference = reference;
    }

    /// Total `insert_task` calls observed, successful or not. Lets tests
    /// assert exactly-once persistence.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    pub fn task(&self, id: TaskId) -> Option<FinalTask> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.task.clone())
    }

    /// Make the next insert fail, simulating a persistence error after
    /// acceptance.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Make reference loads fail, simulating an unreachable store.
    pub fn set_reference_unavailable(&self, unavailable: bool) {
        self.reference_unavailable
            .store(unavailable, Ordering::SeqCst);
    }
}

impl TaskStore for MemoryStore {
    fn load_reference(&self) -> Result<ReferenceData, StorageError> {
        if self.reference_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(self.inner.lock().unwrap().reference.clone())
    }

    fn insert_task(
        &self,
        task: &FinalTask,
        transcript_id: Option<i64>,
    ) -> Result<TaskId, StorageError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Insert("simulated insert failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tasks.push(StoredTask {
            id,
            transcript_id,
            task: task.clone(),
        });
        Ok(id)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = StoreStats {
            total_tasks: inner.tasks.len() as u64,
            ..Default::default()
        };
        for stored in &inner.tasks {
            *stats.by_status.entry("pending".to_string()).or_default() += 1;
            *stats
                .by_priority
                .entry(stored.task.priority_level.as_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }
}
