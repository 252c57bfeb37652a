use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::{
    db::{helpers::parse_datetime, models::AlarmRow, Database},
    reminders::{AlarmKey, AlarmPayload},
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::db";

use crate::log_warn;

impl Database {
    /// Records an armed alarm. Does not wait for the write.
    pub fn persist_alarm(&self, alarm: AlarmRow) -> Result<()> {
        let payload = serde_json::to_string(&alarm.payload).context("failed to encode alarm payload")?;
        self.submit("persist alarm", move |conn| {
            conn.execute(
                "INSERT INTO alarms (key, fire_at, exact, payload, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     fire_at = excluded.fire_at,
                     exact = excluded.exact,
                     payload = excluded.payload,
                     registered_at = excluded.registered_at",
                params![
                    alarm.key.as_storage_key(),
                    alarm.fire_at.to_rfc3339(),
                    alarm.exact,
                    payload,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Forgets an alarm. Does not wait for the write.
    pub fn forget_alarm(&self, key: AlarmKey) -> Result<()> {
        self.submit("forget alarm", move |conn| {
            conn.execute(
                "DELETE FROM alarms WHERE key = ?1",
                params![key.as_storage_key()],
            )?;
            Ok(())
        })
    }

    /// Loads every persisted alarm. Rows that no longer decode are dropped
    /// from the table.
    pub async fn load_alarms(&self) -> Result<Vec<AlarmRow>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, fire_at, exact, payload FROM alarms ORDER BY fire_at ASC")?;
            let mut rows = stmt.query([])?;
            let mut alarms = Vec::new();
            let mut broken = Vec::new();

            while let Some(row) = rows.next()? {
                let raw_key: String = row.get(0)?;
                let fire_at: String = row.get(1)?;
                let exact: bool = row.get(2)?;
                let payload: String = row.get(3)?;

                let decoded = AlarmKey::parse(&raw_key)
                    .ok_or_else(|| anyhow!("invalid alarm key '{raw_key}'"))
                    .and_then(|key| {
                        Ok(AlarmRow {
                            key,
                            fire_at: parse_datetime(&fire_at, "fire_at")?,
                            exact,
                            payload: serde_json::from_str::<AlarmPayload>(&payload)
                                .context("failed to decode alarm payload")?,
                        })
                    });

                match decoded {
                    Ok(alarm) => alarms.push(alarm),
                    Err(err) => {
                        log_warn!("dropping unreadable alarm {raw_key}: {err:#}");
                        broken.push(raw_key);
                    }
                }
            }
            drop(rows);
            drop(stmt);

            for key in broken {
                conn.execute("DELETE FROM alarms WHERE key = ?1", params![key])?;
            }

            Ok(alarms)
        })
        .await
    }

    pub async fn clear_alarms(&self) -> Result<usize> {
        self.execute(|conn| {
            let cleared = conn
                .execute("DELETE FROM alarms", [])
                .context("failed to clear alarms")?;
            Ok(cleared)
        })
        .await
    }
}
