pub mod activity;
pub mod alarm;
pub mod job;

pub use activity::{ActivityKind, ScheduledActivity, Timetable};
pub use alarm::AlarmRow;
pub use job::{Job, JobKind, JobStatus};
