//! Frequency specifications and next-run computation.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use maestro_core::{ScheduleError, Timestamp};
use serde::{Deserialize, Serialize};

/// How often a scheduled task fires.
///
/// `next_run_after` always returns a timestamp strictly after the reference
/// instant: a daily 09:00 task computed at 10:00 lands on 09:00 the next
/// day, never today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    /// Fire once, then deactivate
    Once,
    /// Every minute
    EveryMinute,
    /// Every hour
    EveryHour,
    /// Every day at the given UTC wall time
    Daily { hour: u32, minute: u32 },
    /// On each listed weekday at the given UTC wall time
    Weekly {
        weekdays: Vec<Weekday>,
        hour: u32,
        minute: u32,
    },
    /// Monthly on a day-of-month at the given UTC wall time. Days past the
    /// end of a month clamp to its last day (31 fires on Feb 28).
    Monthly { day: u32, hour: u32, minute: u32 },
}

impl Frequency {
    /// Validate the spec. Malformed frequencies are rejected at scheduling
    /// time and never retried.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let check_time = |hour: u32, minute: u32| {
            if hour > 23 {
                return Err(ScheduleError::InvalidFrequency {
                    reason: format!("hour {} out of range 0-23", hour),
                });
            }
            if minute > 59 {
                return Err(ScheduleError::InvalidFrequency {
                    reason: format!("minute {} out of range 0-59", minute),
                });
            }
            Ok(())
        };

        match self {
            Frequency::Once | Frequency::EveryMinute | Frequency::EveryHour => Ok(()),
            Frequency::Daily { hour, minute } => check_time(*hour, *minute),
            Frequency::Weekly {
                weekdays,
                hour,
                minute,
            } => {
                if weekdays.is_empty() {
                    return Err(ScheduleError::InvalidFrequency {
                        reason: "weekly frequency with empty weekday set".to_string(),
                    });
                }
                check_time(*hour, *minute)
            }
            Frequency::Monthly { day, hour, minute } => {
                if *day == 0 || *day > 31 {
                    return Err(ScheduleError::InvalidFrequency {
                        reason: format!("day-of-month {} out of range 1-31", day),
                    });
                }
                check_time(*hour, *minute)
            }
        }
    }

    /// Compute the next run time strictly after `now`. `None` for `Once`:
    /// a one-shot task has no next run once fired.
    pub fn next_run_after(&self, now: Timestamp) -> Option<Timestamp> {
        match self {
            Frequency::Once => None,
            Frequency::EveryMinute => Some(now + Duration::minutes(1)),
            Frequency::EveryHour => Some(now + Duration::hours(1)),
            Frequency::Daily { hour, minute } => {
                let today = at_wall_time(now.date_naive(), *hour, *minute);
                if today > now {
                    Some(today)
                } else {
                    Some(at_wall_time(
                        now.date_naive() + Duration::days(1),
                        *hour,
                        *minute,
                    ))
                }
            }
            Frequency::Weekly {
                weekdays,
                hour,
                minute,
            } => {
                // Scan the next eight days; with a non-empty weekday set a
                // match is guaranteed.
                for offset in 0..8 {
                    let date = now.date_naive() + Duration::days(offset);
                    if !weekdays.contains(&date.weekday()) {
                        continue;
                    }
                    let candidate = at_wall_time(date, *hour, *minute);
                    if candidate > now {
                        return Some(candidate);
                    }
                }
                None
            }
            Frequency::Monthly { day, hour, minute } => {
                let date = now.date_naive();
                let this_month =
                    at_wall_time(clamped_day(date.year(), date.month(), *day), *hour, *minute);
                if this_month > now {
                    return Some(this_month);
                }
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                Some(at_wall_time(clamped_day(year, month, *day), *hour, *minute))
            }
        }
    }
}

fn at_wall_time(date: NaiveDate, hour: u32, minute: u32) -> Timestamp {
    date.and_hms_opt(hour, minute, 0)
        .expect("validated wall time")
        .and_utc()
}

/// Date for `day` in the given month, clamped to the month's length.
fn clamped_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let last = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, day.min(last)).expect("clamped day is valid")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month")
        .pred_opt()
        .expect("last of month")
        .day()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_specs() {
        assert!(Frequency::Daily { hour: 24, minute: 0 }.validate().is_err());
        assert!(Frequency::Daily { hour: 9, minute: 60 }.validate().is_err());
        assert!(Frequency::Weekly {
            weekdays: vec![],
            hour: 9,
            minute: 0
        }
        .validate()
        .is_err());
        assert!(Frequency::Monthly {
            day: 0,
            hour: 9,
            minute: 0
        }
        .validate()
        .is_err());
        assert!(Frequency::Monthly {
            day: 32,
            hour: 9,
            minute: 0
        }
        .validate()
        .is_err());
        assert!(Frequency::Daily { hour: 9, minute: 0 }.validate().is_ok());
    }

    #[test]
    fn test_once_has_no_next_run() {
        assert_eq!(Frequency::Once.next_run_after(Utc::now()), None);
    }

    #[test]
    fn test_minute_and_hour() {
        let now = at(2025, 6, 10, 10, 0);
        assert_eq!(
            Frequency::EveryMinute.next_run_after(now),
            Some(at(2025, 6, 10, 10, 1))
        );
        assert_eq!(
            Frequency::EveryHour.next_run_after(now),
            Some(at(2025, 6, 10, 11, 0))
        );
    }

    #[test]
    fn test_daily_past_time_rolls_to_tomorrow() {
        // Clock reads 10:00; a 09:00 daily task must land on 09:00 tomorrow.
        let now = at(2025, 6, 10, 10, 0);
        let next = Frequency::Daily { hour: 9, minute: 0 }.next_run_after(now);
        assert_eq!(next, Some(at(2025, 6, 11, 9, 0)));
    }

    #[test]
    fn test_daily_future_time_is_today() {
        let now = at(2025, 6, 10, 8, 0);
        let next = Frequency::Daily { hour: 9, minute: 0 }.next_run_after(now);
        assert_eq!(next, Some(at(2025, 6, 10, 9, 0)));
    }

    #[test]
    fn test_daily_exact_time_is_strictly_after() {
        let now = at(2025, 6, 10, 9, 0);
        let next = Frequency::Daily { hour: 9, minute: 0 }.next_run_after(now);
        assert_eq!(next, Some(at(2025, 6, 11, 9, 0)));
    }

    #[test]
    fn test_weekly_picks_next_listed_weekday() {
        // 2025-06-10 is a Tuesday.
        let now = at(2025, 6, 10, 12, 0);
        let next = Frequency::Weekly {
            weekdays: vec![Weekday::Mon, Weekday::Fri],
            hour: 9,
            minute: 0,
        }
        .next_run_after(now);
        // Friday 2025-06-13 09:00.
        assert_eq!(next, Some(at(2025, 6, 13, 9, 0)));
    }

    #[test]
    fn test_weekly_same_day_past_time_skips_a_week() {
        // Tuesday 12:00, rule fires Tuesdays at 09:00: next Tuesday.
        let now = at(2025, 6, 10, 12, 0);
        let next = Frequency::Weekly {
            weekdays: vec![Weekday::Tue],
            hour: 9,
            minute: 0,
        }
        .next_run_after(now);
        assert_eq!(next, Some(at(2025, 6, 17, 9, 0)));
    }

    #[test]
    fn test_monthly_rolls_to_next_month() {
        let now = at(2025, 6, 20, 12, 0);
        let next = Frequency::Monthly {
            day: 15,
            hour: 9,
            minute: 0,
        }
        .next_run_after(now);
        assert_eq!(next, Some(at(2025, 7, 15, 9, 0)));
    }

    #[test]
    fn test_monthly_day_clamps_to_month_length() {
        // Day 31 scheduled from mid-February: fires on the last day of
        // February, not skipped to March 31.
        let now = at(2025, 2, 10, 12, 0);
        let next = Frequency::Monthly {
            day: 31,
            hour: 9,
            minute: 0,
        }
        .next_run_after(now);
        assert_eq!(next, Some(at(2025, 2, 28, 9, 0)));
    }

    #[test]
    fn test_monthly_december_wraps_year() {
        let now = at(2025, 12, 20, 12, 0);
        let next = Frequency::Monthly {
            day: 10,
            hour: 9,
            minute: 0,
        }
        .next_run_after(now);
        assert_eq!(next, Some(at(2026, 1, 10, 9, 0)));
    }
}
