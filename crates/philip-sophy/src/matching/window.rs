//! Submission-window date math under the 2 AM cutoff policy.
//!
//! Participants who certify between midnight and 01:59 local time are
//! finishing the previous reading day, so the logical `submission_date` they
//! are credited for is yesterday. Only this initial derivation looks at the
//! wall clock; everything downstream compares plain calendar dates.

use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};

/// Local hour at which a reading day closes.
pub const CUTOFF_HOUR: u32 = 2;

/// The logical date a submission made at `now_local` (Asia/Seoul wall clock)
/// counts toward.
pub fn submission_date(now_local: NaiveDateTime) -> NaiveDate {
    if now_local.hour() < CUTOFF_HOUR {
        previous_day(now_local.date())
    } else {
        now_local.date()
    }
}

/// The date whose submissions are eligible for the next matching run.
///
/// Returns `None` during [00:00, 02:00): the prior day's window has not
/// closed yet, so there is no settled target. Callers render that as an
/// empty state rather than an error.
pub fn matching_target_date(now_local: NaiveDateTime) -> Option<NaiveDate> {
    if now_local.hour() < CUTOFF_HOUR {
        return None;
    }
    Some(previous_day(now_local.date()))
}

/// Signed day offset of `date` from the program's start date. Negative when
/// the date precedes the program; the schedule clamps and wraps it.
pub fn program_day_offset(date: NaiveDate, program_start: NaiveDate) -> i64 {
    date.signed_duration_since(program_start).num_days()
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    // NaiveDate::MIN is never a real program date; saturate instead of panic.
    date.checked_sub_days(Days::new(1)).unwrap_or(date)
}
