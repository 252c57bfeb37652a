pub mod clock;
pub mod logging;
pub mod time_fmt;

pub use clock::{Clock, SystemClock};
