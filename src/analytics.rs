//! Pure workout analytics: summary totals, per-exercise aggregates and
//! day-level consistency stats. Everything here is a deterministic
//! transform over a user's records; the evaluation date is passed in so
//! streak logic never reads the system clock.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::WorkoutRecord;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct LastWorkout {
    pub id: String,
    pub workout_performed: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AnalyticsSummary {
    pub total_workouts: i64,
    pub total_time_seconds: i64,
    pub total_time_formatted: String,
    pub total_volume: i64,
    pub active_days: i64,
    pub current_streak: i64,
    pub last_workout: Option<LastWorkout>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ExerciseStat {
    pub exercise: String,
    pub count: i64,
    pub total_sets: i64,
    /// Accumulated volume (sets x reps), kept under the name the
    /// dashboard has always consumed.
    pub total_reps: i64,
    pub total_time_seconds: i64,
    pub total_time_formatted: String,
    pub last_performed: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ExerciseBreakdown {
    pub exercises: Vec<ExerciseStat>,
    pub total_unique_exercises: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ConsistencyStats {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_active_days: i64,
    pub weekly_average: f64,
    pub this_month_days: Vec<String>,
    pub this_month_count: i64,
    pub all_workout_days: Vec<String>,
}

/// Parses an `MM:SS` duration into seconds. Any other shape (missing
/// colon, extra parts, non-numeric parts, empty input) yields `None`.
pub fn parse_duration(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let minutes: i64 = parts[0].trim().parse().ok()?;
    let seconds: i64 = parts[1].trim().parse().ok()?;
    Some(minutes * 60 + seconds)
}

/// Formats seconds as `"{h}h {m}m"` above an hour, `"{m}m"` below.
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Projects a stored timestamp onto its UTC calendar day. Records whose
/// `created_at` does not start with a parseable `YYYY-MM-DD` cannot be
/// placed on the day axis and are skipped by the day-based aggregates.
fn workout_day(created_at: &str) -> Option<NaiveDate> {
    let date_part = created_at.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Distinct active days across the given records, ascending.
fn distinct_days(records: &[WorkoutRecord]) -> Vec<NaiveDate> {
    records
        .iter()
        .filter_map(|r| workout_day(&r.created_at))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Length of the run of consecutive days ending at the most recent
/// active day, or 0 when that day is before yesterday.
fn streak_ending_now(days_asc: &[NaiveDate], today: NaiveDate) -> i64 {
    let Some(&last) = days_asc.last() else {
        return 0;
    };
    if last != today && last != today - Duration::days(1) {
        return 0;
    }
    let mut streak = 1;
    for pair in days_asc.windows(2).rev() {
        if pair[1] - pair[0] == Duration::days(1) {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Overview stats for a user's full record set.
pub fn summary(records: &[WorkoutRecord], today: NaiveDate) -> AnalyticsSummary {
    let total_time_seconds: i64 = records
        .iter()
        .map(|r| r.workout_time_seconds.unwrap_or(0))
        .sum();
    let total_volume: i64 = records
        .iter()
        .map(|r| r.sets.unwrap_or(0) * r.reps.unwrap_or(0))
        .sum();

    let days = distinct_days(records);

    // Most recent record; on equal timestamps the larger id wins so the
    // result is stable across calls.
    let last_workout = records
        .iter()
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|r| LastWorkout {
            id: r.id.clone(),
            workout_performed: r.workout_performed.clone(),
            created_at: r.created_at.clone(),
        });

    AnalyticsSummary {
        total_workouts: records.len() as i64,
        total_time_seconds,
        total_time_formatted: format_duration(total_time_seconds),
        total_volume,
        active_days: days.len() as i64,
        current_streak: streak_ending_now(&days, today),
        last_workout,
    }
}

struct ExerciseAcc {
    count: i64,
    total_sets: i64,
    total_reps: i64,
    total_time_seconds: i64,
    last_performed: String,
    first_seen: usize,
}

/// Groups records by normalized exercise name (trimmed, lowercased) and
/// aggregates per group. Output is sorted by occurrence count
/// descending; ties keep first-seen order.
pub fn exercise_breakdown(records: &[WorkoutRecord]) -> ExerciseBreakdown {
    let mut groups: HashMap<String, ExerciseAcc> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        let name = record.workout_performed.trim().to_lowercase();
        let sets = record.sets.unwrap_or(0);
        let reps = record.reps.unwrap_or(0);

        let acc = groups.entry(name).or_insert(ExerciseAcc {
            count: 0,
            total_sets: 0,
            total_reps: 0,
            total_time_seconds: 0,
            last_performed: String::new(),
            first_seen: index,
        });
        acc.count += 1;
        acc.total_sets += sets;
        acc.total_reps += sets * reps;
        acc.total_time_seconds += record.workout_time_seconds.unwrap_or(0);
        if acc.last_performed.is_empty() || record.created_at > acc.last_performed {
            acc.last_performed = record.created_at.clone();
        }
    }

    let mut entries: Vec<(String, ExerciseAcc)> = groups.into_iter().collect();
    entries.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.1.first_seen.cmp(&b.1.first_seen)));

    let exercises: Vec<ExerciseStat> = entries
        .into_iter()
        .map(|(exercise, acc)| ExerciseStat {
            exercise,
            count: acc.count,
            total_sets: acc.total_sets,
            total_reps: acc.total_reps,
            total_time_seconds: acc.total_time_seconds,
            total_time_formatted: format_duration(acc.total_time_seconds),
            last_performed: acc.last_performed,
        })
        .collect();

    ExerciseBreakdown {
        total_unique_exercises: exercises.len() as i64,
        exercises,
    }
}

/// Streak and frequency stats over a user's active days.
pub fn consistency(records: &[WorkoutRecord], today: NaiveDate) -> ConsistencyStats {
    let days = distinct_days(records);

    let mut longest_streak = 0;
    let mut running = 0;
    for (i, day) in days.iter().enumerate() {
        if i > 0 && *day - days[i - 1] == Duration::days(1) {
            running += 1;
        } else {
            running = 1;
        }
        longest_streak = longest_streak.max(running);
    }

    let current_streak = match days.last() {
        Some(&last) if last == today || last == today - Duration::days(1) => running,
        _ => 0,
    };

    // Trailing four weeks, today inclusive.
    let cutoff = today - Duration::days(27);
    let recent = days.iter().filter(|d| **d >= cutoff).count();
    let weekly_average = (recent as f64 / 4.0 * 10.0).round() / 10.0;

    let month_prefix = today.format("%Y-%m").to_string();
    let all_workout_days: Vec<String> = days
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();
    let this_month_days: Vec<String> = all_workout_days
        .iter()
        .filter(|d| d.starts_with(&month_prefix))
        .cloned()
        .collect();

    ConsistencyStats {
        current_streak,
        longest_streak,
        total_active_days: days.len() as i64,
        weekly_average,
        this_month_count: this_month_days.len() as i64,
        this_month_days,
        all_workout_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        today() - Duration::days(offset)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn record(name: &str, sets: Option<i64>, reps: Option<i64>, created_at: &str) -> WorkoutRecord {
        WorkoutRecord {
            id: format!("{name}-{created_at}"),
            user_id: "user-1".to_string(),
            workout_performed: name.to_string(),
            activity: None,
            sets,
            reps,
            muscle_target: None,
            workout_time: None,
            workout_time_seconds: None,
            created_at: created_at.to_string(),
        }
    }

    fn record_on(name: &str, date: NaiveDate) -> WorkoutRecord {
        record(name, Some(3), Some(10), &format!("{date}T10:00:00Z"))
    }

    #[test]
    fn parse_duration_accepts_minutes_and_seconds() {
        assert_eq!(parse_duration("5:30"), Some(330));
        assert_eq!(parse_duration("90:00"), Some(5400));
    }

    #[test]
    fn parse_duration_rejects_malformed_input() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("bad"), None);
        assert_eq!(parse_duration("1:2:3"), None);
        assert_eq!(parse_duration("5:xx"), None);
    }

    #[test]
    fn format_duration_switches_at_one_hour() {
        assert_eq!(format_duration(330), "5m");
        assert_eq!(format_duration(3661), "1h 1m");
        assert_eq!(format_duration(0), "0m");
    }

    #[test]
    fn summary_totals_treat_missing_fields_as_zero() {
        let mut with_time = record("bench press", Some(3), Some(8), "2024-06-10T08:00:00Z");
        with_time.workout_time_seconds = Some(600);
        let records = vec![
            with_time,
            record("squat", Some(5), Some(5), "2024-06-11T08:00:00Z"),
            record("plank", None, None, "2024-06-11T18:00:00Z"),
        ];

        let s = summary(&records, today());
        assert_eq!(s.total_workouts, 3);
        assert_eq!(s.total_volume, 3 * 8 + 5 * 5);
        assert_eq!(s.total_time_seconds, 600);
        assert_eq!(s.total_time_formatted, "10m");
        assert_eq!(s.active_days, 2);
    }

    #[test]
    fn summary_last_workout_is_most_recent_record() {
        let records = vec![
            record("squat", Some(5), Some(5), "2024-06-11T08:00:00Z"),
            record("bench press", Some(3), Some(8), "2024-06-12T08:00:00Z"),
        ];
        let s = summary(&records, today());
        let last = s.last_workout.unwrap();
        assert_eq!(last.workout_performed, "bench press");
        assert_eq!(last.created_at, "2024-06-12T08:00:00Z");
    }

    #[test]
    fn summary_streak_counts_consecutive_days_ending_today() {
        let records: Vec<WorkoutRecord> = (0..4).map(|i| record_on("run", day(i))).collect();
        let s = summary(&records, today());
        assert_eq!(s.current_streak, 4);
    }

    #[test]
    fn summary_streak_is_zero_when_last_day_is_stale() {
        let records = vec![record_on("run", day(10)), record_on("run", day(9))];
        let s = summary(&records, today());
        assert_eq!(s.current_streak, 0);
    }

    #[test]
    fn summary_of_empty_input_is_all_zero() {
        let s = summary(&[], today());
        assert_eq!(s.total_workouts, 0);
        assert_eq!(s.total_volume, 0);
        assert_eq!(s.active_days, 0);
        assert_eq!(s.current_streak, 0);
        assert_eq!(s.total_time_formatted, "0m");
        assert!(s.last_workout.is_none());
    }

    #[test]
    fn unparseable_created_at_keeps_totals_but_skips_day_stats() {
        let records = vec![
            record_on("run", today()),
            record("squat", Some(2), Some(10), "not-a-timestamp"),
        ];
        let s = summary(&records, today());
        assert_eq!(s.total_workouts, 2);
        assert_eq!(s.total_volume, 3 * 10 + 2 * 10);
        assert_eq!(s.active_days, 1);

        let c = consistency(&records, today());
        assert_eq!(c.total_active_days, 1);
    }

    #[test]
    fn grouping_folds_case_and_whitespace() {
        let records = vec![
            record("Push Up", Some(3), Some(10), "2024-06-10T08:00:00Z"),
            record("push up ", Some(2), Some(12), "2024-06-11T08:00:00Z"),
        ];
        let breakdown = exercise_breakdown(&records);
        assert_eq!(breakdown.total_unique_exercises, 1);
        let stat = &breakdown.exercises[0];
        assert_eq!(stat.exercise, "push up");
        assert_eq!(stat.count, 2);
        assert_eq!(stat.total_sets, 5);
        assert_eq!(stat.total_reps, 3 * 10 + 2 * 12);
        assert_eq!(stat.last_performed, "2024-06-11T08:00:00Z");
    }

    #[test]
    fn grouping_sorts_by_count_descending() {
        let mut records = Vec::new();
        for _ in 0..3 {
            records.push(record("squat", Some(1), Some(1), "2024-06-10T08:00:00Z"));
        }
        records.push(record("deadlift", Some(1), Some(1), "2024-06-10T09:00:00Z"));
        for _ in 0..2 {
            records.push(record("bench", Some(1), Some(1), "2024-06-10T10:00:00Z"));
        }

        let breakdown = exercise_breakdown(&records);
        let counts: Vec<i64> = breakdown.exercises.iter().map(|e| e.count).collect();
        assert_eq!(counts, vec![3, 2, 1]);
        assert_eq!(breakdown.exercises[0].exercise, "squat");
    }

    #[test]
    fn grouping_of_empty_input_is_empty() {
        let breakdown = exercise_breakdown(&[]);
        assert!(breakdown.exercises.is_empty());
        assert_eq!(breakdown.total_unique_exercises, 0);
    }

    #[test]
    fn consistency_full_run_ending_today() {
        let records: Vec<WorkoutRecord> = (0..4).map(|i| record_on("run", day(i))).collect();
        let c = consistency(&records, today());
        assert_eq!(c.current_streak, 4);
        assert_eq!(c.longest_streak, 4);
        assert_eq!(c.total_active_days, 4);
    }

    #[test]
    fn consistency_broken_run_ending_yesterday() {
        let records = vec![
            record_on("run", day(10)),
            record_on("run", day(9)),
            record_on("run", day(1)),
        ];
        let c = consistency(&records, today());
        assert_eq!(c.current_streak, 1);
        assert_eq!(c.longest_streak, 2);
    }

    #[test]
    fn consistency_stale_run_has_no_current_streak() {
        let records = vec![record_on("run", day(10)), record_on("run", day(9))];
        let c = consistency(&records, today());
        assert_eq!(c.current_streak, 0);
        assert_eq!(c.longest_streak, 2);
    }

    #[test]
    fn consistency_weekly_average_covers_trailing_four_weeks() {
        // 8 active days inside the 28-day window, 1 outside it.
        let mut records: Vec<WorkoutRecord> =
            (0..8).map(|i| record_on("run", day(i * 3))).collect();
        records.push(record_on("run", day(40)));

        let c = consistency(&records, today());
        assert_eq!(c.weekly_average, 2.0);
        assert_eq!(c.total_active_days, 9);
    }

    #[test]
    fn consistency_month_days_match_evaluation_month() {
        let records = vec![
            record_on("run", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            record_on("run", NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()),
            record_on("run", NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()),
        ];
        let c = consistency(&records, today());
        assert_eq!(c.this_month_days, vec!["2024-06-01", "2024-06-14"]);
        assert_eq!(c.this_month_count, 2);
        assert_eq!(
            c.all_workout_days,
            vec!["2024-05-31", "2024-06-01", "2024-06-14"]
        );
    }

    #[test]
    fn consistency_of_empty_input_is_all_zero() {
        let c = consistency(&[], today());
        assert_eq!(c.current_streak, 0);
        assert_eq!(c.longest_streak, 0);
        assert_eq!(c.total_active_days, 0);
        assert_eq!(c.weekly_average, 0.0);
        assert!(c.this_month_days.is_empty());
        assert!(c.all_workout_days.is_empty());
    }

    #[test]
    fn computations_are_deterministic() {
        let records = vec![
            record("Push Up", Some(3), Some(10), "2024-06-10T08:00:00Z"),
            record("Squat", Some(5), Some(5), "2024-06-11T08:00:00Z"),
            record("push up", Some(2), Some(12), "2024-06-12T08:00:00Z"),
        ];
        assert_eq!(summary(&records, today()), summary(&records, today()));
        assert_eq!(exercise_breakdown(&records), exercise_breakdown(&records));
        assert_eq!(
            consistency(&records, today()),
            consistency(&records, today())
        );
    }
}
