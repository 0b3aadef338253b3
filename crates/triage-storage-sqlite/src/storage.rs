use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use triage_core::{
    Category, CategorySla, FinalTask, Participant, Patient, Policy, PolicyRow, PriorityWeight,
    ReferenceData,
};
use triage_storage::{StorageError, StoreStats, TaskId, TaskStore};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::Unavailable(format!("open {}: {e}", db_path.display())))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(unavailable)?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(unavailable)?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load reference rows into an empty or existing database. Intended for
    /// seeding dev/test environments; production reference data is managed
    /// outside this service.
    pub fn seed_reference(&self, reference: &ReferenceData) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(query)?;
        for p in &reference.participants {
            tx.execute(
                "INSERT OR REPLACE INTO participants(participant_id, name, role, active)
                 VALUES (?1, ?2, ?3, ?4)",
                params![p.id, p.name, p.role, p.active as i64],
            )
            .map_err(query)?;
        }
        for p in &reference.patients {
            tx.execute(
                "INSERT OR REPLACE INTO patients(patient_id, name, mrn, high_acuity, critical_status, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    p.id,
                    p.name,
                    p.mrn,
                    p.high_acuity as i64,
                    p.critical_status as i64,
                    p.active as i64
                ],
            )
            .map_err(query)?;
        }
        for c in &reference.categories {
            tx.execute(
                "INSERT OR REPLACE INTO task_categories(category_id, category_name, requires_patient, requires_participant, requires_due_date, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    c.id,
                    c.name,
                    c.requires_patient as i64,
                    c.requires_participant as i64,
                    c.requires_due_date as i64,
                    c.active as i64
                ],
            )
            .map_err(query)?;
        }
        for s in &reference.slas {
            tx.execute(
                "INSERT OR REPLACE INTO category_sla(category_id, sla_hours, escalation_hours)
                 VALUES (?1, ?2, ?3)",
                params![s.category_id, s.sla_hours, s.escalation_hours],
            )
            .map_err(query)?;
        }
        for w in &reference.weights {
            tx.execute(
                "INSERT OR REPLACE INTO priority_weights(weight_group, weight_name, weight_value, active)
                 VALUES (?1, ?2, ?3, 1)",
                params![w.group, w.name, w.value],
            )
            .map_err(query)?;
        }
        for p in &reference.policies {
            let doc = serde_json::to_string(&p.document)
                .map_err(|e| StorageError::Query(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO task_policies(policy_version, policy_data, active, effective_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![p.version, doc, p.active as i64, Utc::now().to_rfc3339()],
            )
            .map_err(query)?;
        }
        tx.commit().map_err(query)?;
        Ok(())
    }
}

impl TaskStore for SqliteStore {
    fn load_reference(&self) -> Result<ReferenceData, StorageError> {
        let conn = self.conn.lock().unwrap();
        // One transaction for the whole read, so a concurrent policy flip
        // cannot be observed half-applied.
        let tx = conn.unchecked_transaction().map_err(unavailable)?;

        let mut participants = Vec::new();
        {
            let mut stmt = tx
                .prepare("SELECT participant_id, name, role, active FROM participants")
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(Participant {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        role: r.get(2)?,
                        active: r.get::<_, i64>(3)? != 0,
                    })
                })
                .map_err(query)?;
            for row in rows {
                participants.push(row.map_err(query)?);
            }
        }

        let mut patients = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT patient_id, name, mrn, high_acuity, critical_status, active FROM patients",
                )
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(Patient {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        mrn: r.get(2)?,
                        high_acuity: r.get::<_, i64>(3)? != 0,
                        critical_status: r.get::<_, i64>(4)? != 0,
                        active: r.get::<_, i64>(5)? != 0,
                    })
                })
                .map_err(query)?;
            for row in rows {
                patients.push(row.map_err(query)?);
            }
        }

        let mut categories = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT category_id, category_name, requires_patient, requires_participant, requires_due_date, active
                     FROM task_categories",
                )
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(Category {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        requires_patient: r.get::<_, i64>(2)? != 0,
                        requires_participant: r.get::<_, i64>(3)? != 0,
                        requires_due_date: r.get::<_, i64>(4)? != 0,
                        active: r.get::<_, i64>(5)? != 0,
                    })
                })
                .map_err(query)?;
            for row in rows {
                categories.push(row.map_err(query)?);
            }
        }

        let mut slas = Vec::new();
        {
            let mut stmt = tx
                .prepare("SELECT category_id, sla_hours, escalation_hours FROM category_sla")
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(CategorySla {
                        category_id: r.get(0)?,
                        sla_hours: r.get(1)?,
                        escalation_hours: r.get(2)?,
                    })
                })
                .map_err(query)?;
            for row in rows {
                slas.push(row.map_err(query)?);
            }
        }

        let mut weights = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "SELECT weight_group, weight_name, weight_value FROM priority_weights WHERE active = 1",
                )
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(PriorityWeight {
                        group: r.get(0)?,
                        name: r.get(1)?,
                        value: r.get(2)?,
                    })
                })
                .map_err(query)?;
            for row in rows {
                weights.push(row.map_err(query)?);
            }
        }

        let mut policies = Vec::new();
        {
            let mut stmt = tx
                .prepare("SELECT policy_version, policy_data, active FROM task_policies")
                .map_err(query)?;
            let rows = stmt
                .query_map([], |r| {
                    let version: String = r.get(0)?;
                    let raw: String = r.get(1)?;
                    let active: i64 = r.get(2)?;
                    Ok((version, raw, active != 0))
                })
                .map_err(query)?;
            for row in rows {
                let (version, raw, active) = row.map_err(query)?;
                let document: Policy = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Query(format!("policy {version}: {e}")))?;
                policies.push(PolicyRow {
                    version,
                    active,
                    document,
                });
            }
        }

        tx.commit().map_err(query)?;
        Ok(ReferenceData {
            participants,
            patients,
            categories,
            slas,
            weights,
            policies,
        })
    }

    fn insert_task(
        &self,
        task: &FinalTask,
        transcript_id: Option<i64>,
    ) -> Result<TaskId, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction().map_err(insert)?;

        let draft = &task.task.draft;
        tx.execute(
            "INSERT INTO tasks (
                transcript_id, participant_id, patient_id, category_id,
                description, due_date, confidence,
                priority_score, priority_level,
                source_spans, enriched_fields, score_breakdown,
                lineage_metadata, qa_metadata, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                transcript_id,
                draft.participant_id,
                draft.patient_id,
                draft.category_id,
                draft.description,
                draft.due_date.map(|d: DateTime<Utc>| d.to_rfc3339()),
                draft.confidence,
                task.priority_score,
                task.priority_level.as_str(),
                to_json(&draft.source_spans)?,
                to_json(&task.task.enriched_fields)?,
                to_json(&task.score_breakdown)?,
                to_json(&task.lineage_metadata)?,
                to_json(&task.qa_metadata)?,
                "pending",
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(insert)?;

        let task_id = tx.last_insert_rowid();
        tx.commit().map_err(insert)?;
        Ok(task_id)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stats = StoreStats::default();

        stats.total_tasks = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get::<_, i64>(0))
            .map_err(query)? as u64;

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")
            .map_err(query)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
            .map_err(query)?;
        for row in rows {
            let (status, count) = row.map_err(query)?;
            stats.by_status.insert(status, count as u64);
        }

        let mut stmt = conn
            .prepare("SELECT priority_level, COUNT(*) FROM tasks GROUP BY priority_level")
            .map_err(query)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
            .map_err(query)?;
        for row in rows {
            let (level, count) = row.map_err(query)?;
            stats.by_priority.insert(level, count as u64);
        }

        Ok(stats)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Insert(e.to_string()))
}

fn unavailable(e: rusqlite::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn query(e: rusqlite::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn insert(e: rusqlite::Error) -> StorageError {
    StorageError::Insert(e.to_string())
}
