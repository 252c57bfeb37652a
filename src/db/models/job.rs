use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reminders::AlarmKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    /// Re-arm one alarm after it fired.
    Reschedule(AlarmKey),
    /// Rebuild every alarm of the active timetable.
    RescheduleAll,
}

impl JobKind {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobKind::Reschedule(_) => "reschedule",
            JobKind::RescheduleAll => "reschedule_all",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            JobKind::Reschedule(key) => key.as_storage_key(),
            JobKind::RescheduleAll => String::new(),
        }
    }

    pub fn from_parts(job_type: &str, payload: &str) -> Result<Self> {
        match job_type {
            "reschedule" => AlarmKey::parse(payload)
                .map(JobKind::Reschedule)
                .ok_or_else(|| anyhow!("invalid reschedule payload '{payload}'")),
            "reschedule_all" => Ok(JobKind::RescheduleAll),
            other => Err(anyhow!("unknown job type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    /// Failed permanently; kept for inspection, never retried.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "dead" => Ok(JobStatus::Dead),
            other => Err(anyhow!("unknown job status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempts: u32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
