use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

pub const LAST_BOOT_TIME: &str = "last_boot_time";

impl Database {
    pub async fn get_engine_state(&self, key: &'static str) -> Result<Option<String>> {
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM engine_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read engine state {key}"))?;
            Ok(value)
        })
        .await
    }

    pub async fn set_engine_state(&self, key: &'static str, value: String) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO engine_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("failed to write engine state {key}"))?;
            Ok(())
        })
        .await
    }
}
