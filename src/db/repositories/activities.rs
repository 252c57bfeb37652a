use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Deserialize;

use crate::{
    db::{
        helpers::non_blank,
        models::{ActivityKind, ScheduledActivity, Timetable},
        Database,
    },
    reminders::ActivitySource,
};

const ACTIVITY_COLUMNS: &str = "id, timetable_id, day_of_week, start_minute, end_minute, title, \
     kind, note, notify_enabled, lead_minutes, announce_message";

/// Timetable file accepted by `studyguard import`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableImport {
    pub name: String,
    #[serde(default)]
    pub activities: Vec<ActivityImport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityImport {
    pub day_of_week: u8,
    pub start_minute: u32,
    pub end_minute: u32,
    pub title: String,
    #[serde(default)]
    pub kind: ActivityKind,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_notify")]
    pub notify_enabled: bool,
    #[serde(default)]
    pub lead_minutes: u32,
    #[serde(default)]
    pub announce_message: Option<String>,
}

fn default_notify() -> bool {
    true
}

// Out-of-range stored values become values the scheduler rejects, so one
// bad row is skipped instead of failing the whole read.
fn row_to_activity(row: &Row) -> Result<ScheduledActivity> {
    let day: i64 = row.get("day_of_week")?;
    let start: i64 = row.get("start_minute")?;
    let end: i64 = row.get("end_minute")?;
    let lead: i64 = row.get("lead_minutes")?;
    let kind: String = row.get("kind")?;

    Ok(ScheduledActivity {
        id: row.get("id")?,
        timetable_id: row.get("timetable_id")?,
        day_of_week: u8::try_from(day).unwrap_or(0),
        start_minute: u32::try_from(start).unwrap_or(u32::MAX),
        end_minute: u32::try_from(end).unwrap_or(u32::MAX),
        title: row.get("title")?,
        kind: ActivityKind::parse(&kind).unwrap_or_default(),
        note: non_blank(row.get("note")?),
        notify_enabled: row.get("notify_enabled")?,
        lead_minutes: u32::try_from(lead.max(0)).unwrap_or(u32::MAX),
        announce_message: non_blank(row.get("announce_message")?),
    })
}

impl Database {
    pub async fn get_activity(&self, activity_id: i64) -> Result<Option<ScheduledActivity>> {
        self.execute(move |conn| {
            let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![activity_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_activity(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Activities of a timetable with notifications switched on, in weekly
    /// order.
    pub async fn get_enabled_activities(&self, timetable_id: i64) -> Result<Vec<ScheduledActivity>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE timetable_id = ?1 AND notify_enabled = 1
                 ORDER BY day_of_week ASC, start_minute ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![timetable_id])?;
            let mut activities = Vec::new();
            while let Some(row) = rows.next()? {
                activities.push(row_to_activity(row)?);
            }
            Ok(activities)
        })
        .await
    }

    pub async fn get_timetable(&self, timetable_id: i64) -> Result<Option<Timetable>> {
        self.execute(move |conn| {
            let timetable = conn
                .query_row(
                    "SELECT id, name FROM timetables WHERE id = ?1",
                    params![timetable_id],
                    |row| {
                        Ok(Timetable {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(timetable)
        })
        .await
    }

    pub async fn get_timetables(&self) -> Result<Vec<Timetable>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM timetables ORDER BY id ASC")?;
            let mut rows = stmt.query([])?;
            let mut timetables = Vec::new();
            while let Some(row) = rows.next()? {
                timetables.push(Timetable {
                    id: row.get(0)?,
                    name: row.get(1)?,
                });
            }
            Ok(timetables)
        })
        .await
    }

    /// Inserts a timetable with all of its activities in one transaction.
    pub async fn import_timetable(&self, import: TimetableImport) -> Result<Timetable> {
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO timetables (name, created_at, updated_at) VALUES (?1, ?2, ?3)",
                params![import.name, now, now],
            )
            .context("failed to insert timetable")?;
            let timetable_id = tx.last_insert_rowid();

            for activity in &import.activities {
                tx.execute(
                    "INSERT INTO activities (timetable_id, day_of_week, start_minute, end_minute,
                         title, kind, note, notify_enabled, lead_minutes, announce_message,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        timetable_id,
                        activity.day_of_week,
                        activity.start_minute,
                        activity.end_minute,
                        activity.title,
                        activity.kind.as_str(),
                        activity.note,
                        activity.notify_enabled,
                        activity.lead_minutes,
                        activity.announce_message,
                        now,
                        now,
                    ],
                )
                .with_context(|| format!("failed to insert activity '{}'", activity.title))?;
            }

            tx.commit().context("failed to commit timetable import")?;

            Ok(Timetable {
                id: timetable_id,
                name: import.name,
            })
        })
        .await
    }

    pub async fn set_activity_notify(&self, activity_id: i64, enabled: bool) -> Result<bool> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE activities SET notify_enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![enabled, Utc::now().to_rfc3339(), activity_id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn delete_activity(&self, activity_id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let deleted = conn.execute("DELETE FROM activities WHERE id = ?1", params![activity_id])?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[async_trait]
impl ActivitySource for Database {
    async fn get_activity(&self, activity_id: i64) -> Result<Option<ScheduledActivity>> {
        Database::get_activity(self, activity_id).await
    }

    async fn get_enabled_activities(&self, timetable_id: i64) -> Result<Vec<ScheduledActivity>> {
        Database::get_enabled_activities(self, timetable_id).await
    }

    async fn get_timetable(&self, timetable_id: i64) -> Result<Option<Timetable>> {
        Database::get_timetable(self, timetable_id).await
    }
}
