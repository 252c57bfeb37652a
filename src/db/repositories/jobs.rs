use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    helpers::{parse_datetime, to_u32},
    models::{Job, JobKind, JobStatus},
    Database,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::jobs";

use crate::log_warn;

/// A job the worker took ownership of. `attempts` already counts this run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub id: String,
    pub kind: JobKind,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub dead: u64,
}

fn row_to_job(row: &Row) -> Result<Job> {
    let job_type: String = row.get("job_type")?;
    let payload: String = row.get("payload")?;
    let status: String = row.get("status")?;
    let next_run_at: String = row.get("next_run_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Job {
        id: row.get("id")?,
        kind: JobKind::from_parts(&job_type, &payload)?,
        status: JobStatus::parse(&status)?,
        attempts: to_u32(row.get("attempts")?, "attempts")?,
        next_run_at: parse_datetime(&next_run_at, "next_run_at")?,
        last_error: row.get("last_error")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

/// Inserts a pending job unless an identical one is already waiting.
/// Returns the id of the job that will carry out the work.
pub(crate) fn insert_job(
    conn: &Connection,
    id: &str,
    kind: JobKind,
    now: DateTime<Utc>,
) -> Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM jobs
             WHERE job_type = ?1 AND payload = ?2 AND status = 'pending'
             LIMIT 1",
            params![kind.job_type(), kind.payload()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(existing) = existing {
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO jobs (id, job_type, payload, status, attempts, next_run_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4, ?4)",
        params![id, kind.job_type(), kind.payload(), now.to_rfc3339()],
    )
    .with_context(|| format!("failed to insert {} job", kind.job_type()))?;
    Ok(id.to_string())
}

impl Database {
    pub async fn enqueue_job(&self, kind: JobKind, now: DateTime<Utc>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.execute(move |conn| insert_job(conn, &id, kind, now)).await
    }

    /// Hands jobs interrupted by a crash back to the queue.
    pub async fn reset_running_jobs(&self) -> Result<usize> {
        self.execute(|conn| {
            let reset = conn
                .execute(
                    "UPDATE jobs SET status = 'pending' WHERE status = 'running'",
                    [],
                )
                .context("failed to reset running jobs")?;
            Ok(reset)
        })
        .await
    }

    /// Atomically marks the oldest due job as running. Rows that cannot be
    /// decoded are dead-lettered on the way.
    pub async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<ClaimedJob>> {
        self.execute(move |conn| {
            let now_str = now.to_rfc3339();
            let tx = conn.transaction()?;

            let claimed = loop {
                let candidate = tx
                    .query_row(
                        "SELECT id, job_type, payload, attempts FROM jobs
                         WHERE status = 'pending' AND next_run_at <= ?1
                         ORDER BY next_run_at ASC, created_at ASC, rowid ASC
                         LIMIT 1",
                        params![now_str],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((id, job_type, payload, attempts)) = candidate else {
                    break None;
                };

                match JobKind::from_parts(&job_type, &payload) {
                    Ok(kind) => {
                        tx.execute(
                            "UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?1
                             WHERE id = ?2",
                            params![now_str, id],
                        )?;
                        break Some(ClaimedJob {
                            id,
                            kind,
                            attempts: to_u32(attempts, "attempts")?.saturating_add(1),
                        });
                    }
                    Err(err) => {
                        log_warn!("dead-lettering undecodable job {id}: {err}");
                        tx.execute(
                            "UPDATE jobs SET status = 'dead', last_error = ?1, updated_at = ?2
                             WHERE id = ?3",
                            params![err.to_string(), now_str, id],
                        )?;
                    }
                }
            };

            tx.commit().context("failed to commit job claim")?;
            Ok(claimed)
        })
        .await
    }

    /// Returns a claimed job to `pending` without touching its schedule.
    pub async fn release_job(&self, job_id: &str) -> Result<()> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'pending' WHERE id = ?1 AND status = 'running'",
                params![job_id],
            )
            .context("failed to release job")?;
            Ok(())
        })
        .await
    }

    pub async fn complete_job(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'done', last_error = NULL, updated_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), job_id],
            )
            .context("failed to complete job")?;
            Ok(())
        })
        .await
    }

    pub async fn retry_job(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let job_id = job_id.to_string();
        let error = error.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'pending', next_run_at = ?1, last_error = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![next_run_at.to_rfc3339(), error, now.to_rfc3339(), job_id],
            )
            .context("failed to reschedule job retry")?;
            Ok(())
        })
        .await
    }

    pub async fn dead_letter_job(&self, job_id: &str, error: &str, now: DateTime<Utc>) -> Result<()> {
        let job_id = job_id.to_string();
        let error = error.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'dead', last_error = ?1, updated_at = ?2 WHERE id = ?3",
                params![error, now.to_rfc3339(), job_id],
            )
            .context("failed to dead-letter job")?;
            Ok(())
        })
        .await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_type, payload, status, attempts, next_run_at, last_error, created_at, updated_at
                 FROM jobs WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![job_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_job(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn job_counts(&self) -> Result<JobCounts> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
            let mut rows = stmt.query([])?;
            let mut counts = JobCounts::default();
            while let Some(row) = rows.next()? {
                let status: String = row.get(0)?;
                let count = u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0);
                match JobStatus::parse(&status)? {
                    JobStatus::Pending => counts.pending = count,
                    JobStatus::Running => counts.running = count,
                    JobStatus::Done => counts.done = count,
                    JobStatus::Dead => counts.dead = count,
                }
            }
            Ok(counts)
        })
        .await
    }

    /// Drops finished jobs older than `before`. Dead-lettered rows are kept.
    pub async fn prune_done_jobs(&self, before: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let pruned = conn.execute(
                "DELETE FROM jobs WHERE status = 'done' AND updated_at < ?1",
                params![before.to_rfc3339()],
            )?;
            Ok(pruned)
        })
        .await
    }
}
