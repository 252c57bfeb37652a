mod activities;
mod alarms;
pub mod engine_state;
mod jobs;

pub use activities::{ActivityImport, TimetableImport};
pub(crate) use jobs::insert_job;
pub use jobs::{ClaimedJob, JobCounts};
