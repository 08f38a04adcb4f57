//! Reporting windows.
//!
//! Both the lazy rollover in `award_points` and the weekly-progress report
//! call these, so the two can never disagree about where a week begins.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    midnight(monday)
}

/// First day of the month containing `now`, 00:00 UTC.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    midnight(first)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_start_is_monday() {
        // Sunday 2025-05-18 belongs to the week starting Monday 2025-05-12
        let sunday = Utc.with_ymd_and_hms(2025, 5, 18, 23, 59, 59).unwrap();
        assert_eq!(
            week_start(sunday),
            Utc.with_ymd_and_hms(2025, 5, 12, 0, 0, 0).unwrap()
        );

        let monday = Utc.with_ymd_and_hms(2025, 5, 12, 0, 0, 0).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn test_week_start_crosses_month_boundary() {
        let thursday = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            week_start(thursday),
            Utc.with_ymd_and_hms(2025, 4, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 18, 30, 0).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }
}
