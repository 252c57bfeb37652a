//! Next-occurrence arithmetic for weekly recurring activities.
//!
//! All calendar math happens on the local wall clock of the supplied time
//! zone: "next week" means the same weekday seven calendar days later, so a
//! reminder keeps its wall-clock minute across DST transitions.

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Weekday,
};

use crate::error::{Result, ScheduleError};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Maps 1 (Monday) through 7 (Sunday) to a [`Weekday`].
pub fn weekday_from_number(day_of_week: u8) -> Result<Weekday> {
    match day_of_week {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(ScheduleError::InvalidDay(other)),
    }
}

/// Returns the first instant strictly after `now` that falls on
/// `day_of_week` at `minute_of_day` local time.
///
/// The candidate is this calendar week's requested weekday (weeks start on
/// Monday). When it is not in the future, exactly seven calendar days are
/// added once. Ambiguous local times resolve to the earlier instant; a local
/// time inside a DST gap is pushed forward by one hour.
pub fn next_trigger<Tz: TimeZone>(
    day_of_week: u8,
    minute_of_day: u32,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>> {
    let weekday = weekday_from_number(day_of_week)?;
    let time = time_of_day(minute_of_day)?;

    let tz = now.timezone();
    let today = now.naive_local().date();
    let date = date_in_week_of(today, weekday);

    let candidate = resolve_local(&tz, date.and_time(time))?;
    if candidate > *now {
        return Ok(candidate);
    }

    let next_week = date
        .checked_add_days(Days::new(7))
        .ok_or(ScheduleError::NonexistentLocalTime(date.and_time(time)))?;
    resolve_local(&tz, next_week.and_time(time))
}

fn time_of_day(minute_of_day: u32) -> Result<NaiveTime> {
    if minute_of_day >= MINUTES_PER_DAY {
        return Err(ScheduleError::InvalidMinute(minute_of_day));
    }
    NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)
        .ok_or(ScheduleError::InvalidMinute(minute_of_day))
}

fn date_in_week_of(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let from_monday = u64::from(today.weekday().num_days_from_monday());
    let target = u64::from(weekday.num_days_from_monday());
    // Both offsets are < 7, so these never leave chrono's supported range
    // for any date a clock can produce.
    let monday = today
        .checked_sub_days(Days::new(from_monday))
        .unwrap_or(today);
    monday.checked_add_days(Days::new(target)).unwrap_or(monday)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(local + TimeDelta::hours(1)))
            .earliest()
            .ok_or(ScheduleError::NonexistentLocalTime(local)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc};
    use chrono_tz::America::New_York;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn earlier_slot_today_rolls_to_next_week() {
        // 2024-01-01 is a Monday.
        let now = utc(2024, 1, 1, 8, 0);
        let trigger = next_trigger(1, 7 * 60 + 25, &now).unwrap();
        assert_eq!(trigger, utc(2024, 1, 8, 7, 25));
    }

    #[test]
    fn later_day_this_week_stays_in_week() {
        let now = utc(2024, 1, 1, 8, 0);
        let trigger = next_trigger(2, 17 * 60 + 50, &now).unwrap();
        assert_eq!(trigger, utc(2024, 1, 2, 17, 50));
    }

    #[test]
    fn exact_now_is_not_in_the_future() {
        let now = utc(2024, 1, 3, 12, 0);
        let trigger = next_trigger(3, 12 * 60, &now).unwrap();
        assert_eq!(trigger, utc(2024, 1, 10, 12, 0));
    }

    #[test]
    fn sunday_from_sunday_evening_wraps() {
        let now = utc(2024, 1, 7, 23, 59);
        assert_eq!(next_trigger(7, 0, &now).unwrap(), utc(2024, 1, 14, 0, 0));
        assert_eq!(next_trigger(1, 0, &now).unwrap(), utc(2024, 1, 8, 0, 0));
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        let now = utc(2024, 1, 1, 0, 0);
        assert!(matches!(
            next_trigger(0, 60, &now),
            Err(ScheduleError::InvalidDay(0))
        ));
        assert!(matches!(
            next_trigger(8, 60, &now),
            Err(ScheduleError::InvalidDay(8))
        ));
        assert!(matches!(
            next_trigger(1, 1440, &now),
            Err(ScheduleError::InvalidMinute(1440))
        ));
    }

    #[test]
    fn uses_local_wall_clock_of_offset_zone() {
        // 2024-01-01 23:30 at +02:00 is still Monday locally, Monday 21:30 UTC.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).single().unwrap();
        let trigger = next_trigger(2, 0, &now).unwrap();
        assert_eq!(trigger.weekday(), Weekday::Tue);
        assert_eq!(trigger.naive_local().time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(trigger.with_timezone(&Utc), utc(2024, 1, 1, 22, 0));
    }

    #[test]
    fn rollover_across_spring_forward_keeps_wall_clock() {
        // New York leaves EST for EDT at 02:00 on Sunday 2024-03-10.
        let now = New_York.with_ymd_and_hms(2024, 3, 9, 9, 0, 0).single().unwrap();
        let trigger = next_trigger(6, 8 * 60, &now).unwrap();

        assert_eq!(trigger.naive_local(), naive(2024, 3, 16, 8, 0));
        // 12:00 UTC, one hour short of a fixed 168h step.
        assert_eq!(trigger.with_timezone(&Utc), utc(2024, 3, 16, 12, 0));
    }

    #[test]
    fn slot_inside_dst_gap_moves_forward_an_hour() {
        let now = New_York.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single().unwrap();
        let trigger = next_trigger(7, 2 * 60 + 30, &now).unwrap();

        assert_eq!(trigger.naive_local(), naive(2024, 3, 10, 3, 30));
        assert_eq!(trigger.with_timezone(&Utc), utc(2024, 3, 10, 7, 30));
    }

    #[test]
    fn ambiguous_slot_takes_earlier_instant() {
        // 01:00-02:00 repeats on Sunday 2024-11-03 when EDT falls back to EST.
        let saturday = New_York.with_ymd_and_hms(2024, 11, 2, 12, 0, 0).single().unwrap();
        let first = next_trigger(7, 90, &saturday).unwrap();
        assert_eq!(first.with_timezone(&Utc), utc(2024, 11, 3, 5, 30));

        // Ten minutes after the first 01:30 the slot belongs to next week,
        // even though the repeated 01:30 is still ahead.
        let after_first = first + TimeDelta::minutes(10);
        let next = next_trigger(7, 90, &after_first).unwrap();
        assert_eq!(next.naive_local(), naive(2024, 11, 10, 1, 30));
        assert_eq!(next.with_timezone(&Utc), utc(2024, 11, 10, 6, 30));
    }

    #[test]
    fn result_is_future_on_requested_day_and_minute() {
        let zones = [
            FixedOffset::east_opt(0).unwrap(),
            FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            FixedOffset::west_opt(8 * 3600).unwrap(),
        ];
        let nows = [
            utc(2024, 1, 1, 0, 0),
            utc(2024, 2, 29, 13, 37),
            utc(2024, 3, 31, 23, 59),
            utc(2024, 12, 31, 23, 30),
        ];

        for tz in zones {
            for now_utc in nows {
                let now = now_utc.with_timezone(&tz);
                for day in 1..=7u8 {
                    for minute in (0..MINUTES_PER_DAY).step_by(17) {
                        let trigger = next_trigger(day, minute, &now).unwrap();
                        assert!(trigger > now, "{day}/{minute} from {now}");
                        assert!(trigger - now.clone() <= TimeDelta::days(7));
                        assert_eq!(
                            trigger.weekday().number_from_monday(),
                            u32::from(day)
                        );
                        let local = trigger.naive_local();
                        assert_eq!(local.hour() * 60 + local.minute(), minute);
                    }
                }
            }
        }
    }
}
