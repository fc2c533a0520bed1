//! Month arithmetic shared by installments, billing cycles and bills.
//!
//! Every helper clamps the day of month to the last valid day of the target
//! month, so Jan 31 plus one month is Feb 28 (or Feb 29 in leap years).

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

/// Number of days in the given month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// Date in the given month with `day` clamped to the month length.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

/// Shift a timestamp by whole months, clamping the day.
pub fn add_months(at: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
}

pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// The (year, month) `offset` months after the given one.
pub fn month_offset(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let index = (year as i64) * 12 + (month as i64 - 1) + offset as i64;
    ((index.div_euclid(12)) as i32, (index.rem_euclid(12) + 1) as u32)
}

/// Last second of the given day, in UTC.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}

/// (year, month) of a timestamp.
pub fn year_month(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}
