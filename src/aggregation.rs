//! Learning analytics over a user's daily activity log.
//!
//! Every function here is a pure computation over data the caller has
//! already fetched. Empty inputs produce zero or neutral values, and every
//! ratio checks its denominator, so no function in this module can fail.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::catalog::CategoryLookup;
use crate::model::{
    ActivityLog, Category, Course, DailyActivity, DashboardCourse, DashboardResponse, Enrollment,
    EnrollmentSummary, LearningInsights, PeakHours, StudySession, UserAnalytics, WeekSummary,
};

/// Number of recorded days in each velocity window.
const VELOCITY_WINDOW_DAYS: usize = 7;

/// Engagement score multipliers and weights (percent).
const CONSISTENCY_WEIGHT: f64 = 30.0;
const STUDY_HOURS_MULTIPLIER: f64 = 2.0;
const STUDY_HOURS_WEIGHT: f64 = 25.0;
const COURSES_MULTIPLIER: f64 = 10.0;
const COURSES_WEIGHT: f64 = 20.0;
const LESSONS_MULTIPLIER: f64 = 2.0;
const LESSONS_WEIGHT: f64 = 15.0;
const STREAK_MULTIPLIER: f64 = 5.0;
const STREAK_WEIGHT: f64 = 10.0;

/// Consecutive active days ending on `today`.
///
/// A day counts when it has any study time or any completed lesson; a date
/// with no record is an empty day. The walk stops at the first empty day, so
/// an inactive `today` yields 0.
pub fn current_streak(activity: &ActivityLog, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;

    while activity.get(&day).is_some_and(DailyActivity::is_active) {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }

    streak
}

/// Longest run of consecutive calendar dates in the log.
pub fn longest_streak(activity: &ActivityLog) -> u32 {
    let mut dates = activity.keys();
    let Some(mut previous) = dates.next().copied() else {
        return 0;
    };

    let mut longest = 1;
    let mut run = 1;

    for &date in dates {
        if date.signed_duration_since(previous).num_days() == 1 {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
        previous = date;
    }

    longest
}

/// Percentage of recorded days with study time, rounded.
pub fn consistency(activity: &ActivityLog) -> u32 {
    if activity.is_empty() {
        return 0;
    }

    let active_days = activity.values().filter(|d| d.study_time > 0).count();
    (active_days as f64 / activity.len() as f64 * 100.0).round() as u32
}

/// Mean study time in seconds over days with study time.
pub fn average_study_time(activity: &ActivityLog) -> f64 {
    let (total, days) = activity
        .values()
        .filter(|d| d.study_time > 0)
        .fold((0u64, 0u32), |(total, days), d| (total.saturating_add(d.study_time), days + 1));

    if days == 0 {
        0.0
    } else {
        total as f64 / f64::from(days)
    }
}

/// Percent change in mean daily study time from the first seven recorded
/// dates to the last seven.
///
/// With fewer than fourteen dates the two windows overlap. When the first
/// window averages zero the result is 100 if the last window has any study
/// time and 0 otherwise.
pub fn learning_velocity(activity: &ActivityLog) -> i64 {
    let days: Vec<&DailyActivity> = activity.values().collect();

    let first = &days[..days.len().min(VELOCITY_WINDOW_DAYS)];
    let last = &days[days.len().saturating_sub(VELOCITY_WINDOW_DAYS)..];

    let first_average = mean_study_time(first);
    let last_average = mean_study_time(last);

    if first_average == 0.0 {
        return if last_average > 0.0 { 100 } else { 0 };
    }

    ((last_average - first_average) / first_average * 100.0).round() as i64
}

fn mean_study_time(days: &[&DailyActivity]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }

    let total: u64 = days.iter().map(|d| d.study_time).sum();
    total as f64 / days.len() as f64
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_sunday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Per-week totals, ordered by week start.
pub fn weekly_averages(activity: &ActivityLog) -> Vec<WeekSummary> {
    let mut weeks: BTreeMap<NaiveDate, WeekSummary> = BTreeMap::new();

    for (&date, day) in activity {
        let start = week_start(date);
        let week = weeks.entry(start).or_insert_with(|| WeekSummary {
            week_start: start,
            active_days: 0,
            total_study_time: 0,
            total_lessons: 0,
            average_study_time: 0.0,
        });

        if day.study_time > 0 {
            week.active_days += 1;
        }
        week.total_study_time = week.total_study_time.saturating_add(day.study_time);
        week.total_lessons += u64::from(day.lessons_completed);
    }

    weeks
        .into_values()
        .map(|mut week| {
            if week.active_days > 0 {
                week.average_study_time =
                    week.total_study_time as f64 / f64::from(week.active_days);
            }
            week
        })
        .collect()
}

/// Share of study time by part of day.
///
/// Only daily totals are recorded, so each active day is split evenly across
/// morning, afternoon and evening. Evening takes the rounding remainder so
/// the three shares sum to 100.
pub fn peak_hours(activity: &ActivityLog) -> PeakHours {
    let mut slots = [0.0f64; 3];

    for day in activity.values().filter(|d| d.study_time > 0) {
        let portion = day.study_time as f64 / 3.0;
        for slot in &mut slots {
            *slot += portion;
        }
    }

    let total: f64 = slots.iter().sum();
    if total <= 0.0 {
        return PeakHours::default();
    }

    let morning = (slots[0] / total * 100.0).round() as u32;
    let afternoon = (slots[1] / total * 100.0).round() as u32;

    PeakHours {
        morning,
        afternoon,
        evening: 100u32.saturating_sub(morning + afternoon),
    }
}

/// Weighted 0-100 engagement score. Missing analytics score 0.
///
/// Components, each capped at 100 before weighting: consistency (30%),
/// study hours x2 (25%), completed courses x10 (20%), completed lessons x2
/// (15%) and the stored learning streak x5 (10%).
pub fn engagement_score(analytics: Option<&UserAnalytics>) -> u32 {
    let Some(analytics) = analytics else {
        return 0;
    };

    let study_hours = analytics.total_study_time as f64 / 3600.0;

    let components = [
        (f64::from(consistency(&analytics.daily_activity)), CONSISTENCY_WEIGHT),
        (study_hours * STUDY_HOURS_MULTIPLIER, STUDY_HOURS_WEIGHT),
        (analytics.courses_completed as f64 * COURSES_MULTIPLIER, COURSES_WEIGHT),
        (analytics.lessons_completed as f64 * LESSONS_MULTIPLIER, LESSONS_WEIGHT),
        (f64::from(analytics.learning_streak) * STREAK_MULTIPLIER, STREAK_WEIGHT),
    ];

    let weighted: f64 = components
        .iter()
        .map(|(value, weight)| value.min(100.0) * weight)
        .sum();

    (weighted / 100.0).round() as u32
}

/// The category with the most sessions. Ties go to the first name in order.
pub fn favorite_category(analytics: &UserAnalytics) -> Option<&str> {
    analytics
        .favorite_categories
        .iter()
        .fold(None, |best: Option<(&String, u32)>, (name, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        })
        .map(|(name, _)| name.as_str())
}

impl LearningInsights {
    /// Derive every dashboard metric from one analytics record.
    pub fn compute(analytics: &UserAnalytics, today: NaiveDate) -> Self {
        let activity = &analytics.daily_activity;

        Self {
            total_study_time: analytics.total_study_time,
            lessons_completed: analytics.lessons_completed,
            courses_completed: analytics.courses_completed,
            consistency: consistency(activity),
            current_streak: current_streak(activity, today),
            longest_streak: longest_streak(activity).max(analytics.longest_learning_streak),
            average_study_time: average_study_time(activity),
            learning_velocity: learning_velocity(activity),
            weekly_averages: weekly_averages(activity),
            peak_hours: peak_hours(activity),
            engagement_score: engagement_score(Some(analytics)),
            favorite_category: favorite_category(analytics).map(str::to_string),
        }
    }
}

/// Fold a study session into a user's analytics.
///
/// Adds the session to its day and to the running totals, counts it toward
/// its category, and recomputes the current streak from the latest active
/// date. The longest streak only ever grows.
pub fn record_study_session(analytics: &mut UserAnalytics, session: &StudySession) {
    let day = analytics.daily_activity.entry(session.date).or_default();
    day.study_time = day.study_time.saturating_add(session.study_time);
    day.lessons_completed = day.lessons_completed.saturating_add(session.lessons_completed);

    analytics.total_study_time = analytics.total_study_time.saturating_add(session.study_time);
    analytics.lessons_completed = analytics
        .lessons_completed
        .saturating_add(u64::from(session.lessons_completed));

    if let Some(category) = session.category.as_deref().filter(|c| !c.is_empty()) {
        *analytics
            .favorite_categories
            .entry(category.to_string())
            .or_insert(0) += 1;
    }

    let last_active = analytics
        .last_active_date
        .map_or(session.date, |d| d.max(session.date));
    analytics.last_active_date = Some(last_active);

    analytics.learning_streak = current_streak(&analytics.daily_activity, last_active);
    analytics.longest_learning_streak = analytics
        .longest_learning_streak
        .max(longest_streak(&analytics.daily_activity))
        .max(analytics.learning_streak);
}

/// Enrollment counts. A course is complete exactly when progress is 100.
pub fn summarize_enrollments(enrollments: &[Enrollment]) -> EnrollmentSummary {
    if enrollments.is_empty() {
        return EnrollmentSummary::default();
    }

    let total = enrollments.len();
    let completed = enrollments.iter().filter(|e| e.is_completed()).count();
    let progress_sum: u32 = enrollments.iter().map(|e| u32::from(e.progress)).sum();

    EnrollmentSummary {
        total,
        completed,
        in_progress: total - completed,
        average_progress: (f64::from(progress_sum) / total as f64).round() as u32,
    }
}

/// Assemble the dashboard for one user from a consistent snapshot of reads.
///
/// Enrolled courses are listed most recently accessed first. Enrollments
/// whose course no longer exists are shown under their course id.
pub fn build_dashboard(
    user_id: &str,
    enrollments: &[Enrollment],
    analytics: Option<&UserAnalytics>,
    courses: &[Course],
    categories: &[Category],
    now: DateTime<Utc>,
) -> DashboardResponse {
    let lookup = CategoryLookup::new(categories);
    let by_id: BTreeMap<&str, &Course> = courses.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut enrolled: Vec<DashboardCourse> = enrollments
        .iter()
        .map(|enrollment| {
            let course = by_id.get(enrollment.course_id.as_str());
            DashboardCourse {
                course_id: enrollment.course_id.clone(),
                title: course.map_or_else(|| enrollment.course_id.clone(), |c| c.title.clone()),
                category: course
                    .map(|c| lookup.name_for(&c.category).to_string())
                    .unwrap_or_default(),
                progress: enrollment.progress,
                completed: enrollment.is_completed(),
                last_accessed: enrollment.last_accessed,
            }
        })
        .collect();
    enrolled.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));

    let mut insights =
        LearningInsights::compute(analytics.unwrap_or(&UserAnalytics::default()), now.date_naive());
    insights.favorite_category = insights
        .favorite_category
        .map(|id| lookup.name_for(&id).to_string());

    DashboardResponse {
        user_id: user_id.to_string(),
        summary: summarize_enrollments(enrollments),
        courses: enrolled,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn day(study_time: u64, lessons_completed: u32) -> DailyActivity {
        DailyActivity {
            study_time,
            lessons_completed,
        }
    }

    fn log(entries: &[(&str, u64, u32)]) -> ActivityLog {
        entries
            .iter()
            .map(|&(d, study, lessons)| (date(d), day(study, lessons)))
            .collect()
    }

    #[test]
    fn test_consistency_counts_studied_days() {
        let activity = log(&[("2024-01-01", 600, 1), ("2024-01-02", 0, 0)]);

        assert_eq!(consistency(&activity), 50);
        assert_eq!(current_streak(&activity, date("2024-06-01")), 0);
    }

    #[test]
    fn test_current_streak_walks_back_from_today() {
        let activity = log(&[
            ("2024-03-01", 300, 0),
            ("2024-03-03", 0, 2),
            ("2024-03-04", 120, 1),
            ("2024-03-05", 60, 0),
        ]);

        assert_eq!(current_streak(&activity, date("2024-03-05")), 3);
        assert_eq!(current_streak(&activity, date("2024-03-04")), 2);
        // Nothing recorded today.
        assert_eq!(current_streak(&activity, date("2024-03-06")), 0);
    }

    #[test]
    fn test_current_streak_stops_at_empty_record() {
        let activity = log(&[("2024-03-04", 100, 0), ("2024-03-05", 0, 0)]);

        assert_eq!(current_streak(&activity, date("2024-03-05")), 0);
    }

    #[test]
    fn test_longest_streak() {
        let activity = log(&[("2024-01-01", 1, 0), ("2024-01-02", 1, 0), ("2024-01-04", 1, 0)]);
        assert_eq!(longest_streak(&activity), 2);

        assert_eq!(longest_streak(&ActivityLog::new()), 0);
        assert_eq!(longest_streak(&log(&[("2024-01-01", 1, 0)])), 1);

        let across_month = log(&[
            ("2024-01-30", 1, 0),
            ("2024-01-31", 1, 0),
            ("2024-02-01", 1, 0),
            ("2024-02-03", 1, 0),
        ]);
        assert_eq!(longest_streak(&across_month), 3);
    }

    #[test]
    fn test_empty_log_is_neutral() {
        let activity = ActivityLog::new();

        assert_eq!(consistency(&activity), 0);
        assert_eq!(average_study_time(&activity), 0.0);
        assert_eq!(learning_velocity(&activity), 0);
        assert!(weekly_averages(&activity).is_empty());
        assert_eq!(peak_hours(&activity), PeakHours::default());
        assert_eq!(current_streak(&activity, date("2024-01-01")), 0);
    }

    #[test]
    fn test_average_study_time_ignores_idle_days() {
        let activity = log(&[("2024-01-01", 600, 0), ("2024-01-02", 0, 3), ("2024-01-03", 300, 0)]);

        assert_eq!(average_study_time(&activity), 450.0);
    }

    #[test]
    fn test_learning_velocity() {
        let mut activity = ActivityLog::new();
        let start = date("2024-01-01");
        for i in 0..14u64 {
            let study = if i < 7 { 100 } else { 150 };
            activity.insert(start + Days::new(i), day(study, 0));
        }
        assert_eq!(learning_velocity(&activity), 50);

        let activity = log(&[("2024-01-01", 0, 0), ("2024-01-02", 0, 0)]);
        assert_eq!(learning_velocity(&activity), 0);

        // Growth from nothing.
        let mut activity = ActivityLog::new();
        for i in 0..14u64 {
            activity.insert(start + Days::new(i), day(if i < 7 { 0 } else { 60 }, 0));
        }
        assert_eq!(learning_velocity(&activity), 100);
    }

    #[test]
    fn test_learning_velocity_overlapping_windows() {
        // Fewer than 14 dates: both windows cover the same 3 days.
        let activity = log(&[
            ("2024-01-01", 100, 0),
            ("2024-01-02", 200, 0),
            ("2024-01-03", 300, 0),
        ]);

        assert_eq!(learning_velocity(&activity), 0);
    }

    #[test]
    fn test_weekly_averages() {
        // 2024-01-07 is a Sunday.
        let activity = log(&[
            ("2024-01-05", 600, 1),
            ("2024-01-06", 0, 2),
            ("2024-01-07", 300, 1),
            ("2024-01-08", 900, 0),
        ]);

        let weeks = weekly_averages(&activity);
        assert_eq!(weeks.len(), 2);

        assert_eq!(weeks[0].week_start, date("2023-12-31"));
        assert_eq!(weeks[0].active_days, 1);
        assert_eq!(weeks[0].total_study_time, 600);
        assert_eq!(weeks[0].total_lessons, 3);
        assert_eq!(weeks[0].average_study_time, 600.0);

        assert_eq!(weeks[1].week_start, date("2024-01-07"));
        assert_eq!(weeks[1].active_days, 2);
        assert_eq!(weeks[1].average_study_time, 600.0);
    }

    #[test]
    fn test_week_start_is_sunday() {
        assert_eq!(week_start(date("2024-01-07")), date("2024-01-07"));
        assert_eq!(week_start(date("2024-01-13")), date("2024-01-07"));
    }

    #[test]
    fn test_peak_hours_even_split() {
        let activity = log(&[("2024-01-01", 900, 0), ("2024-01-02", 0, 1)]);

        let peak = peak_hours(&activity);
        assert_eq!(peak.morning + peak.afternoon + peak.evening, 100);
        assert_eq!(peak.morning, 33);
        assert_eq!(peak.afternoon, 33);
    }

    #[test]
    fn test_engagement_weighted_components() {
        // 4 of 5 recorded days with study time: consistency 80.
        let analytics = UserAnalytics {
            total_study_time: 7200,
            courses_completed: 3,
            lessons_completed: 10,
            learning_streak: 5,
            daily_activity: log(&[
                ("2024-01-01", 1800, 0),
                ("2024-01-02", 1800, 0),
                ("2024-01-03", 1800, 0),
                ("2024-01-04", 1800, 0),
                ("2024-01-05", 0, 0),
            ]),
            ..Default::default()
        };

        assert_eq!(consistency(&analytics.daily_activity), 80);
        assert_eq!(engagement_score(Some(&analytics)), 37);
    }

    #[test]
    fn test_engagement_is_capped() {
        let analytics = UserAnalytics {
            total_study_time: 3600 * 1000,
            courses_completed: 50,
            lessons_completed: 500,
            learning_streak: 365,
            daily_activity: log(&[("2024-01-01", 3600, 1)]),
            ..Default::default()
        };

        assert_eq!(engagement_score(Some(&analytics)), 100);
        assert_eq!(engagement_score(None), 0);
        assert_eq!(engagement_score(Some(&UserAnalytics::default())), 0);
    }

    #[test]
    fn test_record_study_session() {
        let mut analytics = UserAnalytics::default();

        for (d, category) in [
            ("2024-02-01", "cat-a"),
            ("2024-02-02", "cat-b"),
            ("2024-02-03", "cat-a"),
        ] {
            record_study_session(
                &mut analytics,
                &StudySession {
                    date: date(d),
                    study_time: 600,
                    lessons_completed: 1,
                    category: Some(category.to_string()),
                },
            );
        }

        assert_eq!(analytics.total_study_time, 1800);
        assert_eq!(analytics.lessons_completed, 3);
        assert_eq!(analytics.learning_streak, 3);
        assert_eq!(analytics.longest_learning_streak, 3);
        assert_eq!(analytics.last_active_date, Some(date("2024-02-03")));
        assert_eq!(favorite_category(&analytics), Some("cat-a"));

        // Backfilling an older day keeps the latest active date.
        record_study_session(
            &mut analytics,
            &StudySession {
                date: date("2024-01-20"),
                study_time: 60,
                lessons_completed: 0,
                category: None,
            },
        );
        assert_eq!(analytics.last_active_date, Some(date("2024-02-03")));
        assert_eq!(analytics.learning_streak, 3);
        assert_eq!(analytics.daily_activity.len(), 4);
    }

    #[test]
    fn test_same_day_sessions_accumulate() {
        let mut analytics = UserAnalytics::default();
        let session = StudySession {
            date: date("2024-02-01"),
            study_time: 300,
            lessons_completed: 2,
            category: None,
        };

        record_study_session(&mut analytics, &session);
        record_study_session(&mut analytics, &session);

        assert_eq!(analytics.daily_activity[&date("2024-02-01")], day(600, 4));
        assert_eq!(analytics.learning_streak, 1);
        assert!(analytics.favorite_categories.is_empty());
    }

    #[test]
    fn test_summarize_enrollments() {
        let now = Utc::now();
        let mut done = Enrollment::new("u", "a", now);
        done.progress = 100;
        let mut halfway = Enrollment::new("u", "b", now);
        halfway.progress = 50;
        let fresh = Enrollment::new("u", "c", now);

        let summary = summarize_enrollments(&[done, halfway, fresh]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.in_progress, 2);
        assert_eq!(summary.average_progress, 50);

        assert_eq!(summarize_enrollments(&[]), EnrollmentSummary::default());
    }

    #[test]
    fn test_build_dashboard() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::hours(1);

        let course = Course {
            id: "rust".into(),
            title: "Rust Basics".into(),
            category: "cat-prog".into(),
            ..serde_json::from_value(serde_json::json!({})).unwrap()
        };
        let categories = vec![Category {
            id: "cat-prog".into(),
            name: "Programming".into(),
        }];

        let mut first = Enrollment::new("u", "rust", earlier);
        first.last_accessed = earlier;
        let second = Enrollment::new("u", "removed", now);

        let mut analytics = UserAnalytics::default();
        record_study_session(
            &mut analytics,
            &StudySession {
                date: now.date_naive(),
                study_time: 1200,
                lessons_completed: 1,
                category: Some("cat-prog".into()),
            },
        );

        let dashboard = build_dashboard(
            "u",
            &[first, second],
            Some(&analytics),
            &[course],
            &categories,
            now,
        );

        assert_eq!(dashboard.summary.total, 2);
        assert_eq!(dashboard.courses[0].course_id, "removed");
        assert_eq!(dashboard.courses[0].title, "removed");
        assert_eq!(dashboard.courses[1].title, "Rust Basics");
        assert_eq!(dashboard.courses[1].category, "Programming");
        assert_eq!(dashboard.insights.current_streak, 1);
        assert_eq!(dashboard.insights.favorite_category.as_deref(), Some("Programming"));

        let empty = build_dashboard("nobody", &[], None, &[], &[], now);
        assert_eq!(empty.insights.engagement_score, 0);
        assert_eq!(empty.insights.peak_hours, PeakHours::default());
    }
}
