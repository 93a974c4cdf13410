//! Progress summary: totals, trailing weeks and streaks
//!
//! [`summarize`] is a pure function of a user's records and a reference
//! time. Calendar days are taken in the time zone of that reference time.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use super::record::ProgressRecord;

/// Number of trailing weeks reported
pub const WEEKS: u32 = 4;

/// One trailing week
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProgress {
    /// 0 is the week ending now
    pub weeks_ago: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes_watched: f64,
    pub videos_completed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_courses_started: usize,
    pub total_courses_completed: usize,
    pub total_videos_watched: usize,
    pub total_videos_completed: usize,
    /// Seconds
    pub total_watch_time: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Oldest week first
    pub weekly_progress: Vec<WeeklyProgress>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Summarize a user's records as of `now`. No records means no summary.
///
/// Week `i` covers `[now - 7(i+1) days, now - 7i days)`; the current week
/// also contains `now` and anything stamped after it. Records without
/// `updated_at` count toward totals only.
pub fn summarize<Tz: TimeZone>(
    records: &[ProgressRecord],
    now: &DateTime<Tz>,
) -> Option<ProgressSummary> {
    if records.is_empty() {
        return None;
    }

    let now_utc = now.with_timezone(&Utc);

    let started: HashSet<&str> = records.iter().map(|r| r.key.course_id.as_str()).collect();
    let completed: HashSet<&str> = records
        .iter()
        .filter(|r| r.is_completed)
        .map(|r| r.key.course_id.as_str())
        .collect();

    let mut weeks: Vec<WeeklyProgress> = (0..WEEKS)
        .rev()
        .map(|i| WeeklyProgress {
            weeks_ago: i,
            start: now_utc - Duration::days(7 * (i as i64 + 1)),
            end: now_utc - Duration::days(7 * i as i64),
            minutes_watched: 0.0,
            videos_completed: 0,
        })
        .collect();

    for record in records {
        let Some(at) = record.updated_at else {
            continue;
        };
        if let Some(i) = week_index(at, now_utc) {
            // weeks are stored oldest first
            let week = &mut weeks[(WEEKS - 1 - i) as usize];
            week.minutes_watched += record.watched_seconds / 60.0;
            if record.is_completed {
                week.videos_completed += 1;
            }
        }
    }

    let tz = now.timezone();
    let days: BTreeSet<NaiveDate> = records
        .iter()
        .filter_map(|r| r.updated_at)
        .map(|at| at.with_timezone(&tz).date_naive())
        .collect();
    let (current_streak, longest_streak) = streaks(&days, now.date_naive());

    Some(ProgressSummary {
        total_courses_started: started.len(),
        total_courses_completed: completed.len(),
        total_videos_watched: records.len(),
        total_videos_completed: records.iter().filter(|r| r.is_completed).count(),
        total_watch_time: records.iter().map(|r| r.watched_seconds).sum(),
        current_streak,
        longest_streak,
        weekly_progress: weeks,
        last_activity: records.iter().filter_map(|r| r.updated_at).max(),
    })
}

fn week_index(at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u32> {
    if at >= now {
        return Some(0);
    }
    let age = now - at;
    let index = age.num_milliseconds() / Duration::days(7).num_milliseconds();
    // exactly 7 days old still belongs to the current week
    let index = if age == Duration::days(7 * index) && index > 0 {
        index - 1
    } else {
        index
    };
    (index < WEEKS as i64).then_some(index as u32)
}

/// Returns (current, longest). The current streak is the run ending today,
/// or yesterday if nothing was watched yet today.
fn streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> (u32, u32) {
    let mut longest = 0;
    let mut run = 0;
    let mut run_end: Option<NaiveDate> = None;
    let mut current = 0;

    for &day in days {
        run = match run_end {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        run_end = Some(day);
        longest = longest.max(run);
        if day <= today && today - day <= Duration::days(1) {
            current = run;
        }
    }

    (current, longest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::record::ProgressKey;
    use chrono::FixedOffset;

    fn record(course: &str, video: &str, watched: f64, done: bool, at: Option<DateTime<Utc>>) -> ProgressRecord {
        ProgressRecord {
            key: ProgressKey::new("u1", course, video),
            watched_seconds: watched,
            last_position: watched,
            total_seconds: 600.0,
            is_completed: done,
            updated_at: at,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_no_records_no_summary() {
        assert!(summarize(&[], &Utc::now()).is_none());
    }

    #[test]
    fn test_totals() {
        let now = at(2026, 3, 6, 12);
        let records = vec![
            record("c1", "v1", 600.0, true, Some(now)),
            record("c1", "v2", 120.0, false, Some(now)),
            record("c2", "v1", 60.0, false, None),
        ];

        let s = summarize(&records, &now).unwrap();

        assert_eq!(s.total_courses_started, 2);
        assert_eq!(s.total_courses_completed, 1);
        assert_eq!(s.total_videos_watched, 3);
        assert_eq!(s.total_videos_completed, 1);
        assert_eq!(s.total_watch_time, 780.0);
        assert_eq!(s.last_activity, Some(now));
    }

    #[test]
    fn test_weekly_buckets_oldest_first() {
        let now = at(2026, 3, 28, 12);
        let records = vec![
            record("c1", "v1", 600.0, true, Some(now - Duration::days(1))),
            record("c1", "v2", 300.0, false, Some(now - Duration::days(10))),
            record("c1", "v3", 120.0, false, Some(now - Duration::days(40))),
        ];

        let s = summarize(&records, &now).unwrap();
        let weeks: Vec<u32> = s.weekly_progress.iter().map(|w| w.weeks_ago).collect();
        assert_eq!(weeks, vec![3, 2, 1, 0]);

        let current = &s.weekly_progress[3];
        assert_eq!(current.minutes_watched, 10.0);
        assert_eq!(current.videos_completed, 1);
        assert_eq!(s.weekly_progress[2].minutes_watched, 5.0);
        // 40 days ago is outside every window but still in totals
        let in_weeks: f64 = s.weekly_progress.iter().map(|w| w.minutes_watched).sum();
        assert_eq!(in_weeks, 15.0);
        assert_eq!(s.total_watch_time, 1020.0);
    }

    #[test]
    fn test_exactly_seven_days_is_current_week() {
        let now = at(2026, 3, 28, 12);
        let seven = now - Duration::days(7);
        let just_over = seven - Duration::seconds(1);

        assert_eq!(week_index(seven, now), Some(0));
        assert_eq!(week_index(just_over, now), Some(1));
        assert_eq!(week_index(now, now), Some(0));
        assert_eq!(week_index(now - Duration::days(28), now), Some(3));
        assert_eq!(week_index(now - Duration::days(28) - Duration::seconds(1), now), None);
    }

    #[test]
    fn test_streak_with_gap() {
        // Mon 2 .. Fri 6 March 2026, Thursday missing
        let records = vec![
            record("c1", "v1", 60.0, false, Some(at(2026, 3, 2, 10))),
            record("c1", "v2", 60.0, false, Some(at(2026, 3, 3, 10))),
            record("c1", "v3", 60.0, false, Some(at(2026, 3, 4, 10))),
            record("c1", "v4", 60.0, false, Some(at(2026, 3, 6, 10))),
        ];

        let s = summarize(&records, &at(2026, 3, 6, 18)).unwrap();

        assert_eq!(s.longest_streak, 3);
        assert_eq!(s.current_streak, 1);
    }

    #[test]
    fn test_current_streak_survives_until_tomorrow() {
        let records = vec![
            record("c1", "v1", 60.0, false, Some(at(2026, 3, 2, 10))),
            record("c1", "v2", 60.0, false, Some(at(2026, 3, 3, 10))),
        ];

        let wednesday = summarize(&records, &at(2026, 3, 4, 9)).unwrap();
        assert_eq!(wednesday.current_streak, 2);

        let thursday = summarize(&records, &at(2026, 3, 5, 9)).unwrap();
        assert_eq!(thursday.current_streak, 0);
        assert_eq!(thursday.longest_streak, 2);
    }

    #[test]
    fn test_streak_days_follow_reference_timezone() {
        // 01:30 UTC on the 3rd is still the 2nd in São Paulo (UTC-3)
        let records = vec![
            record("c1", "v1", 60.0, false, Some(at(2026, 3, 2, 12))),
            record("c1", "v2", 60.0, false, Some(Utc.with_ymd_and_hms(2026, 3, 3, 1, 30, 0).unwrap())),
        ];
        let sao_paulo = FixedOffset::west_opt(3 * 3600).unwrap();

        let utc = summarize(&records, &at(2026, 3, 3, 12)).unwrap();
        let local = summarize(&records, &at(2026, 3, 3, 12).with_timezone(&sao_paulo)).unwrap();

        assert_eq!(utc.longest_streak, 2);
        assert_eq!(local.longest_streak, 1);
        assert_eq!(local.current_streak, 1);
    }
}
