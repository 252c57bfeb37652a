use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    db::{insert_job, Database},
    utils::Clock,
};

use super::{JobKind, JobQueue};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::jobs";

use crate::{log_debug, log_warn};

/// Job queue backed by the `jobs` table. Enqueueing hands the insert to the
/// database thread and wakes the worker. Kinds whose insert fails stay in
/// memory until the worker writes them with [`SqliteJobQueue::flush_unsaved`].
#[derive(Clone)]
pub struct SqliteJobQueue {
    db: Database,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    unsaved: Arc<Mutex<Vec<JobKind>>>,
}

fn lock_unsaved(unsaved: &Mutex<Vec<JobKind>>) -> MutexGuard<'_, Vec<JobKind>> {
    match unsaved.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SqliteJobQueue {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            wake: Arc::new(Notify::new()),
            unsaved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unsaved_len(&self) -> usize {
        lock_unsaved(&self.unsaved).len()
    }

    /// Writes kinds whose earlier insert failed. Anything that fails again
    /// stays queued in memory for the next call.
    pub async fn flush_unsaved(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *lock_unsaved(&self.unsaved));
        let mut written = 0;
        let mut remaining = pending.into_iter();

        while let Some(kind) = remaining.next() {
            if let Err(err) = self.db.enqueue_job(kind, self.clock.now()).await {
                let mut unsaved = lock_unsaved(&self.unsaved);
                unsaved.push(kind);
                unsaved.extend(remaining);
                return Err(err.context("failed to save queued job"));
            }
            written += 1;
        }

        if written > 0 {
            log_warn!("saved {written} job(s) after an earlier insert failure");
        }
        Ok(written)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, kind: JobKind) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let unsaved = self.unsaved.clone();
        let submitted = self.db.submit("enqueue job", move |conn| {
            if let Err(err) = insert_job(conn, &id, kind, now) {
                lock_unsaved(&unsaved).push(kind);
                return Err(err);
            }
            Ok(())
        });
        if let Err(err) = submitted {
            lock_unsaved(&self.unsaved).push(kind);
            return Err(err);
        }
        log_debug!("enqueued {kind:?}");
        self.wake.notify_one();
        Ok(())
    }
}
