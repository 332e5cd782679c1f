//! Calendar arithmetic for recurring payroll schedules.
//!
//! Every function takes an explicit reference instant and returns the next
//! occurrence strictly after it; nothing here reads the wall clock.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::ScheduleError;
use crate::payroll::models::{PayrollSchedule, ScheduleKind};

type Result<T> = std::result::Result<T, ScheduleError>;

fn invalid(msg: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidRecurrenceParameter(msg.into())
}

fn at_time<Tz: TimeZone>(tz: &Tz, date: NaiveDate, tod: NaiveTime) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(tod))
        .earliest()
        .ok_or_else(|| invalid(format!("{} {} does not exist in the target zone", date, tod)))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    // day 0 of the next month
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .expect("valid first-of-month")
        .pred_opt()
        .expect("valid last-of-month")
        .day()
}

fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid")
}

/// Same time today if still in the future, otherwise tomorrow.
pub fn next_daily<Tz: TimeZone>(after: DateTime<Tz>, tod: NaiveTime) -> Result<DateTime<Tz>> {
    let tz = after.timezone();
    let today = after.date_naive();
    let candidate = at_time(&tz, today, tod)?;
    if candidate > after {
        return Ok(candidate);
    }
    at_time(&tz, today + Days::new(1), tod)
}

/// Next `weekday` (0 = Monday .. 6 = Sunday) at `tod`; rolls a full week
/// when today matches but the time has passed.
pub fn next_weekly<Tz: TimeZone>(
    after: DateTime<Tz>,
    tod: NaiveTime,
    weekday: u8,
) -> Result<DateTime<Tz>> {
    if weekday > 6 {
        return Err(invalid(format!("weekday must be 0..=6, got {}", weekday)));
    }
    let tz = after.timezone();
    let today = after.date_naive();
    let current = today.weekday().num_days_from_monday() as u8;
    let delta = (weekday + 7 - current) % 7;
    let candidate_date = today + Days::new(delta as u64);
    let candidate = at_time(&tz, candidate_date, tod)?;
    if candidate > after {
        return Ok(candidate);
    }
    at_time(&tz, candidate_date + Days::new(7), tod)
}

/// Target day-of-month clamped to the month's actual length (day 31 in a
/// 30-day month lands on the 30th); advances one month when passed.
pub fn next_monthly<Tz: TimeZone>(
    after: DateTime<Tz>,
    tod: NaiveTime,
    day_of_month: u8,
) -> Result<DateTime<Tz>> {
    if !(1..=31).contains(&day_of_month) {
        return Err(invalid(format!("day_of_month must be 1..=31, got {}", day_of_month)));
    }
    let tz = after.timezone();
    let (mut year, mut month) = (after.year(), after.month());

    let candidate = at_time(&tz, clamped_date(year, month, day_of_month as u32), tod)?;
    if candidate > after {
        return Ok(candidate);
    }

    if month == 12 {
        year += 1;
        month = 1;
    } else {
        month += 1;
    }
    at_time(&tz, clamped_date(year, month, day_of_month as u32), tod)
}

/// Target month + day, clamped to that month's length for the target year;
/// advances one year when passed.
pub fn next_yearly<Tz: TimeZone>(
    after: DateTime<Tz>,
    tod: NaiveTime,
    month_of_year: u8,
    day_of_year: u8,
) -> Result<DateTime<Tz>> {
    if !(1..=12).contains(&month_of_year) {
        return Err(invalid(format!("month_of_year must be 1..=12, got {}", month_of_year)));
    }
    if !(1..=31).contains(&day_of_year) {
        return Err(invalid(format!("day_of_year must be 1..=31, got {}", day_of_year)));
    }
    let tz = after.timezone();
    let year = after.year();

    let candidate = at_time(
        &tz,
        clamped_date(year, month_of_year as u32, day_of_year as u32),
        tod,
    )?;
    if candidate > after {
        return Ok(candidate);
    }
    at_time(
        &tz,
        clamped_date(year + 1, month_of_year as u32, day_of_year as u32),
        tod,
    )
}

/// Dispatch on the schedule's recurrence kind. Instant schedules have no
/// next occurrence.
pub fn next_occurrence(
    schedule: &PayrollSchedule,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let tod = match schedule.kind {
        ScheduleKind::Instant => return Ok(None),
        _ => schedule
            .time_of_day
            .ok_or_else(|| invalid("time_of_day is required for recurring schedules"))?,
    };

    let next = match schedule.kind {
        ScheduleKind::Instant => unreachable!(),
        ScheduleKind::Daily => next_daily(after, tod)?,
        ScheduleKind::Weekly => {
            let weekday = schedule
                .weekday
                .ok_or_else(|| invalid("weekday is required for weekly schedules"))?;
            let weekday = u8::try_from(weekday)
                .map_err(|_| invalid(format!("weekday must be 0..=6, got {}", weekday)))?;
            next_weekly(after, tod, weekday)?
        }
        ScheduleKind::Monthly => {
            let dom = schedule
                .day_of_month
                .ok_or_else(|| invalid("day_of_month is required for monthly schedules"))?;
            let dom = u8::try_from(dom)
                .map_err(|_| invalid(format!("day_of_month must be 1..=31, got {}", dom)))?;
            next_monthly(after, tod, dom)?
        }
        ScheduleKind::Yearly => {
            let moy = schedule
                .month_of_year
                .ok_or_else(|| invalid("month_of_year is required for yearly schedules"))?;
            let doy = schedule
                .day_of_year
                .ok_or_else(|| invalid("day_of_year is required for yearly schedules"))?;
            let moy = u8::try_from(moy)
                .map_err(|_| invalid(format!("month_of_year must be 1..=12, got {}", moy)))?;
            let doy = u8::try_from(doy)
                .map_err(|_| invalid(format!("day_of_year must be 1..=31, got {}", doy)))?;
            next_yearly(after, tod, moy, doy)?
        }
    };
    Ok(Some(next))
}
