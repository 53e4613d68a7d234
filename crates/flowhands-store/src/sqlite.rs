//! SQLite store.
//!
//! Timestamps are stored as RFC 3339 text and JSON payloads as text. Status
//! transitions run inside a transaction and go through
//! [`RunRecord::apply`], the same rule the in-memory store uses.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use tokio_rusqlite::Connection;
use tracing::debug;

use flowhands_protocols::error::PersistenceError;
use flowhands_protocols::record::{
    Metadata, RunRecord, RunStatus, StatusUpdate, StepCompletion, StepRecord, StepStatus,
    SuspensionRecord, SuspensionStatus,
};
use flowhands_protocols::store::{RunStore, SuspensionStore};

use crate::schema::init_schema;

const RUN_COLUMNS: &str = "id, flow_id, session_id, status, input_data, result, error, \
                           started_at, completed_at, metadata";
const STEP_COLUMNS: &str = "id, run_id, step_name, step_index, status, event_type, event_data, \
                            started_at, completed_at, duration_ms";
const SUSPENSION_COLUMNS: &str = "workflow_id, run_id, flow_id, session_id, prompt, operator, \
                                  snapshot, status, created_at, updated_at";

/// SQLite-backed durable store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().await.map_err(storage)?;
        Self::init(conn).await
    }

    /// Open (or create) a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening SQLite store at {:?}", path);
        let conn = Connection::open(path).await.map_err(storage)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(storage)?;
        Ok(Self { conn })
    }
}

fn storage(e: tokio_rusqlite::Error) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion(idx, e)),
        None => Ok(None),
    }
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion(idx, e))
}

fn optional_json_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| conversion(idx, e)),
        None => Ok(None),
    }
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = PersistenceError>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion(idx, e))
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        flow_id: row.get(1)?,
        session_id: row.get(2)?,
        status: parsed_at::<RunStatus>(row, 3)?,
        input: json_at(row, 4)?,
        result: optional_json_at(row, 5)?,
        error: row.get(6)?,
        started_at: time_at(row, 7)?,
        completed_at: optional_time_at(row, 8)?,
        metadata: json_at::<Metadata>(row, 9)?,
    })
}

fn row_to_step(row: &Row<'_>) -> rusqlite::Result<StepRecord> {
    let duration: Option<i64> = row.get(9)?;
    Ok(StepRecord {
        id: row.get(0)?,
        run_id: row.get(1)?,
        step_name: row.get(2)?,
        step_index: row.get(3)?,
        status: parsed_at::<StepStatus>(row, 4)?,
        event_type: row.get(5)?,
        event_data: json_at(row, 6)?,
        started_at: time_at(row, 7)?,
        completed_at: optional_time_at(row, 8)?,
        duration_ms: duration.map(|d| d.max(0) as u64),
    })
}

fn row_to_suspension(row: &Row<'_>) -> rusqlite::Result<SuspensionRecord> {
    Ok(SuspensionRecord {
        workflow_id: row.get(0)?,
        run_id: row.get(1)?,
        flow_id: row.get(2)?,
        session_id: row.get(3)?,
        prompt: row.get(4)?,
        operator: row.get(5)?,
        snapshot: json_at(row, 6)?,
        status: parsed_at::<SuspensionStatus>(row, 7)?,
        created_at: time_at(row, 8)?,
        updated_at: time_at(row, 9)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl RunStore for SqliteStore {
    fn id(&self) -> &str {
        "sqlite"
    }

    async fn create_run(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        let run = run.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO runs (id, flow_id, session_id, status, input_data, result, error,
                                       started_at, completed_at, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        run.id,
                        run.flow_id,
                        run.session_id,
                        run.status.as_str(),
                        to_json(&run.input)?,
                        run.result.as_ref().map(to_json).transpose()?,
                        run.error,
                        run.started_at.to_rfc3339(),
                        run.completed_at.map(|t| t.to_rfc3339()),
                        to_json(&run.metadata)?,
                    ],
                );
                match result {
                    Ok(_) => Ok(Ok(())),
                    Err(e) if is_constraint_violation(&e) => {
                        Ok(Err(PersistenceError::Duplicate(run.id)))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(storage)?;
        inserted
    }

    async fn update_run_status(
        &self,
        run_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), PersistenceError> {
        let run_id = run_id.to_string();
        let update = update.clone();
        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let run = tx
                    .query_row(
                        &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                        [&run_id],
                        row_to_run,
                    )
                    .optional()?;
                let Some(mut run) = run else {
                    return Ok(Err(PersistenceError::NotFound(run_id)));
                };
                if let Err(e) = run.apply(&update) {
                    return Ok(Err(e));
                }

                tx.execute(
                    "UPDATE runs SET status = ?1, result = ?2, error = ?3, completed_at = ?4,
                                     metadata = ?5
                     WHERE id = ?6",
                    params![
                        run.status.as_str(),
                        run.result.as_ref().map(to_json).transpose()?,
                        run.error,
                        run.completed_at.map(|t| t.to_rfc3339()),
                        to_json(&run.metadata)?,
                        run.id,
                    ],
                )?;
                tx.commit()?;
                Ok(Ok(()))
            })
            .await
            .map_err(storage)?;
        applied
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError> {
        let run_id = run_id.to_string();
        self.conn
            .call(move |conn| {
                let run = conn
                    .query_row(
                        &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                        [&run_id],
                        row_to_run,
                    )
                    .optional()?;
                Ok(run)
            })
            .await
            .map_err(storage)
    }

    async fn append_step(&self, step: &StepRecord) -> Result<(), PersistenceError> {
        let step = step.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO steps (id, run_id, step_name, step_index, status, event_type,
                                        event_data, started_at, completed_at, duration_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        step.id,
                        step.run_id,
                        step.step_name,
                        step.step_index,
                        step.status.as_str(),
                        step.event_type,
                        to_json(&step.event_data)?,
                        step.started_at.to_rfc3339(),
                        step.completed_at.map(|t| t.to_rfc3339()),
                        step.duration_ms.map(|d| d as i64),
                    ],
                );
                match result {
                    Ok(_) => Ok(Ok(())),
                    Err(e) if is_constraint_violation(&e) => Ok(Err(PersistenceError::Duplicate(
                        format!("{}#{}", step.run_id, step.step_index),
                    ))),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(storage)?;
        inserted
    }

    async fn complete_step(&self, completion: &StepCompletion) -> Result<(), PersistenceError> {
        let completion = completion.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE steps SET status = ?1, event_type = ?2, event_data = ?3,
                                      completed_at = ?4, duration_ms = ?5
                     WHERE run_id = ?6 AND step_index = ?7",
                    params![
                        StepStatus::Completed.as_str(),
                        completion.event_type,
                        to_json(&completion.event_data)?,
                        completion.completed_at.to_rfc3339(),
                        completion.duration_ms as i64,
                        completion.run_id,
                        completion.step_index,
                    ],
                )?;
                Ok((changed, completion))
            })
            .await
            .map_err(storage)?;

        match changed {
            (0, completion) => Err(PersistenceError::NotFound(format!(
                "{}#{}",
                completion.run_id, completion.step_index
            ))),
            _ => Ok(()),
        }
    }

    async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, PersistenceError> {
        let run_id = run_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM steps WHERE run_id = ?1 ORDER BY step_index ASC",
                    STEP_COLUMNS
                ))?;
                let steps = stmt
                    .query_map([&run_id], row_to_step)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(steps)
            })
            .await
            .map_err(storage)
    }
}

#[async_trait]
impl SuspensionStore for SqliteStore {
    async fn save_suspension(&self, record: &SuspensionRecord) -> Result<(), PersistenceError> {
        let record = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO suspensions (workflow_id, run_id, flow_id, session_id,
                        prompt, operator, snapshot, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        record.workflow_id,
                        record.run_id,
                        record.flow_id,
                        record.session_id,
                        record.prompt,
                        record.operator,
                        to_json(&record.snapshot)?,
                        record.status.as_str(),
                        record.created_at.to_rfc3339(),
                        record.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(storage)
    }

    async fn get_suspension(
        &self,
        workflow_id: &str,
    ) -> Result<Option<SuspensionRecord>, PersistenceError> {
        let workflow_id = workflow_id.to_string();
        self.conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM suspensions WHERE workflow_id = ?1",
                            SUSPENSION_COLUMNS
                        ),
                        [&workflow_id],
                        row_to_suspension,
                    )
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(storage)
    }

    async fn update_suspension_status(
        &self,
        workflow_id: &str,
        status: SuspensionStatus,
    ) -> Result<(), PersistenceError> {
        let id = workflow_id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE suspensions SET status = ?1, updated_at = ?2 WHERE workflow_id = ?3",
                    params![status.as_str(), Utc::now().to_rfc3339(), id],
                )?;
                Ok(changed)
            })
            .await
            .map_err(storage)?;

        if changed == 0 {
            return Err(PersistenceError::NotFound(workflow_id.to_string()));
        }
        Ok(())
    }

    async fn claim_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError> {
        let id = workflow_id.to_string();
        self.conn
            .call(move |conn| {
                // Single conditional UPDATE: SQLite serializes writers, so
                // only one claimant sees a changed row.
                let changed = conn.execute(
                    "UPDATE suspensions SET status = ?1, updated_at = ?2
                     WHERE workflow_id = ?3 AND status = ?4",
                    params![
                        SuspensionStatus::Completed.as_str(),
                        Utc::now().to_rfc3339(),
                        id,
                        SuspensionStatus::PendingInput.as_str()
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage)
    }

    async fn delete_suspension(&self, workflow_id: &str) -> Result<bool, PersistenceError> {
        let id = workflow_id.to_string();
        self.conn
            .call(move |conn| {
                let changed =
                    conn.execute("DELETE FROM suspensions WHERE workflow_id = ?1", [&id])?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage)
    }
}
