//! Data models for Lectern.
//!
//! Domain documents ([`Course`], [`Category`], [`Enrollment`],
//! [`UserAnalytics`]) use camelCase field names, matching the documents held
//! by the upstream store. Request and response types of the HTTP API use
//! snake_case.
//!
//! The upstream store is schema-less, so course fields are read leniently: a
//! numeric field holding the wrong shape is treated as absent rather than
//! failing the whole document.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::SortKey;
use crate::date::DateValue;

/// Rating shown for courses that have not been rated yet.
pub const DEFAULT_RATING: f64 = 4.5;

/// Per-day activity keyed by calendar date.
pub type ActivityLog = BTreeMap<NaiveDate, DailyActivity>;

/// Course difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    #[default]
    Unset,
}

impl Difficulty {
    /// Case-insensitive parse. Anything unrecognized is `Unset`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "beginner" => Difficulty::Beginner,
            "intermediate" => Difficulty::Intermediate,
            "advanced" => Difficulty::Advanced,
            _ => Difficulty::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Unset => "unset",
        }
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(Difficulty::parse).unwrap_or_default())
    }
}

/// Course length as stored: minutes, or an `"H:MM"` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CourseDuration {
    Minutes(f64),
    Text(String),
}

/// A course in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default, deserialize_with = "text")]
    pub id: String,

    #[serde(default, deserialize_with = "text")]
    pub title: String,

    #[serde(default, deserialize_with = "text")]
    pub description: String,

    /// Category id or name. Resolved through a
    /// [`CategoryLookup`](crate::catalog::CategoryLookup).
    #[serde(default, deserialize_with = "text")]
    pub category: String,

    #[serde(default, deserialize_with = "text")]
    pub instructor: String,

    #[serde(default, deserialize_with = "text")]
    pub language: String,

    #[serde(default)]
    pub difficulty: Difficulty,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub duration: Option<CourseDuration>,

    /// Missing or zero means free.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// 0 to 5. See [`Course::display_rating`].
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub enrollment_count: Option<u64>,

    #[serde(default)]
    pub created_at: DateValue,
}

impl Course {
    /// Rating for display, substituting [`DEFAULT_RATING`] when unrated.
    pub fn display_rating(&self) -> f64 {
        self.rating.unwrap_or(DEFAULT_RATING)
    }
}

/// A course category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "text")]
    pub id: String,

    #[serde(default, deserialize_with = "text")]
    pub name: String,
}

/// A user's enrollment in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    /// `"{userId}_{courseId}"`; one enrollment per user and course.
    pub id: String,

    pub user_id: String,

    pub course_id: String,

    /// 0 to 100. A course is complete exactly when this is 100.
    pub progress: u8,

    #[serde(default)]
    pub completed_lessons: BTreeSet<String>,

    pub enrolled_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

impl Enrollment {
    pub fn new(user_id: &str, course_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::enrollment_id(user_id, course_id),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            progress: 0,
            completed_lessons: BTreeSet::new(),
            enrolled_at: now,
            last_accessed: now,
            completed_at: None,
            certificate_id: None,
        }
    }

    pub fn enrollment_id(user_id: &str, course_id: &str) -> String {
        format!("{user_id}_{course_id}")
    }

    pub fn is_completed(&self) -> bool {
        self.progress == 100
    }

    /// Mark a lesson as done and recompute progress.
    ///
    /// Progress is the share of `total_lessons` completed, rounded and capped
    /// at 100; a `total_lessons` of 0 leaves it unchanged. Returns `true` only
    /// on the call that takes the course to completion.
    pub fn complete_lesson(
        &mut self,
        lesson_id: &str,
        total_lessons: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let was_completed = self.is_completed();

        self.completed_lessons.insert(lesson_id.to_string());
        self.last_accessed = now;

        if total_lessons > 0 {
            let share = self.completed_lessons.len() as f64 / f64::from(total_lessons) * 100.0;
            self.progress = share.round().min(100.0) as u8;
        }

        if self.is_completed() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        !was_completed && self.is_completed()
    }
}

/// Activity recorded for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyActivity {
    /// Seconds studied.
    pub study_time: u64,

    pub lessons_completed: u32,
}

impl DailyActivity {
    /// Any study time or any completed lesson.
    pub fn is_active(&self) -> bool {
        self.study_time > 0 || self.lessons_completed > 0
    }
}

/// Cumulative learning analytics for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAnalytics {
    /// Seconds.
    pub total_study_time: u64,

    pub lessons_completed: u64,

    pub courses_completed: u64,

    pub daily_activity: ActivityLog,

    pub learning_streak: u32,

    pub longest_learning_streak: u32,

    /// Study sessions per category.
    pub favorite_categories: BTreeMap<String, u32>,

    pub last_active_date: Option<NaiveDate>,
}

/// Partial update of a [`UserAnalytics`] record. Present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsPatch {
    pub total_study_time: Option<u64>,
    pub lessons_completed: Option<u64>,
    pub courses_completed: Option<u64>,
    pub daily_activity: Option<ActivityLog>,
    pub learning_streak: Option<u32>,
    pub longest_learning_streak: Option<u32>,
    pub favorite_categories: Option<BTreeMap<String, u32>>,
    pub last_active_date: Option<NaiveDate>,
}

impl AnalyticsPatch {
    pub fn is_empty(&self) -> bool {
        *self == AnalyticsPatch::default()
    }

    pub fn apply(self, analytics: &mut UserAnalytics) {
        if let Some(v) = self.total_study_time {
            analytics.total_study_time = v;
        }
        if let Some(v) = self.lessons_completed {
            analytics.lessons_completed = v;
        }
        if let Some(v) = self.courses_completed {
            analytics.courses_completed = v;
        }
        if let Some(v) = self.daily_activity {
            analytics.daily_activity = v;
        }
        if let Some(v) = self.learning_streak {
            analytics.learning_streak = v;
        }
        if let Some(v) = self.longest_learning_streak {
            analytics.longest_learning_streak = v;
        }
        if let Some(v) = self.favorite_categories {
            analytics.favorite_categories = v;
        }
        if let Some(v) = self.last_active_date {
            analytics.last_active_date = Some(v);
        }
    }
}

impl From<UserAnalytics> for AnalyticsPatch {
    fn from(analytics: UserAnalytics) -> Self {
        Self {
            total_study_time: Some(analytics.total_study_time),
            lessons_completed: Some(analytics.lessons_completed),
            courses_completed: Some(analytics.courses_completed),
            daily_activity: Some(analytics.daily_activity),
            learning_streak: Some(analytics.learning_streak),
            longest_learning_streak: Some(analytics.longest_learning_streak),
            favorite_categories: Some(analytics.favorite_categories),
            last_active_date: analytics.last_active_date,
        }
    }
}

/// One study session to fold into a user's analytics.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySession {
    pub date: NaiveDate,
    pub study_time: u64,
    pub lessons_completed: u32,
    pub category: Option<String>,
}

/// Study sessions per Sunday-start calendar week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    pub week_start: NaiveDate,
    pub active_days: u32,
    pub total_study_time: u64,
    pub total_lessons: u64,
    /// Seconds per active day.
    pub average_study_time: f64,
}

/// Share of study time per part of the day, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeakHours {
    pub morning: u32,
    pub afternoon: u32,
    pub evening: u32,
}

impl Default for PeakHours {
    fn default() -> Self {
        Self {
            morning: 33,
            afternoon: 33,
            evening: 34,
        }
    }
}

/// Everything the dashboard derives from a user's analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningInsights {
    pub total_study_time: u64,
    pub lessons_completed: u64,
    pub courses_completed: u64,
    pub consistency: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub average_study_time: f64,
    pub learning_velocity: i64,
    pub weekly_averages: Vec<WeekSummary>,
    pub peak_hours: PeakHours,
    pub engagement_score: u32,
    pub favorite_category: Option<String>,
}

/// Enrollment counts for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollmentSummary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub average_progress: u32,
}

/// One enrolled course as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardCourse {
    pub course_id: String,
    pub title: String,
    pub category: String,
    pub progress: u8,
    pub completed: bool,
    pub last_accessed: DateTime<Utc>,
}

/// Response for GET /users/:user_id/dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardResponse {
    pub user_id: String,
    pub summary: EnrollmentSummary,
    pub courses: Vec<DashboardCourse>,
    pub insights: LearningInsights,
}

/// Response for GET /courses.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogResponse {
    /// Courses in the catalog before filtering.
    pub total_courses: usize,

    /// Courses left after filtering.
    pub matched: usize,

    pub sort: SortKey,

    pub courses: Vec<Course>,
}

/// Query parameters for GET /courses.
///
/// Every facet is optional; `"all"` or an empty value leaves it inactive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    /// `short`, `medium` or `long`.
    pub duration: Option<String>,
    pub instructor: Option<String>,
    /// `free` or `paid`.
    pub price: Option<String>,
    pub sort: Option<String>,
}

/// Request body for POST /users/:user_id/enrollments.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub course_id: String,
}

/// Request body for POST /users/:user_id/enrollments/:course_id/lessons.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonRequest {
    pub lesson_id: String,
    pub total_lessons: u32,
}

/// Request body for POST /users/:user_id/activity.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRequest {
    /// Defaults to today (UTC).
    pub date: Option<NaiveDate>,

    /// Seconds.
    #[serde(default)]
    pub study_time: u64,

    #[serde(default)]
    pub lessons_completed: u32,

    pub category: Option<String>,
}

impl ActivityRequest {
    pub fn into_session(self, today: NaiveDate) -> StudySession {
        StudySession {
            date: self.date.unwrap_or(today),
            study_time: self.study_time,
            lessons_completed: self.lessons_completed,
            category: self.category,
        }
    }
}

/// Deserialize a field, treating any value of the wrong shape as absent.
///
/// Numbers stored as strings (`"49.99"`) are read as numbers.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;

    if let Ok(parsed) = serde_json::from_value(value.clone()) {
        return Ok(Some(parsed));
    }

    Ok(value
        .as_str()
        .and_then(|s| serde_json::from_str::<Value>(s.trim()).ok())
        .filter(Value::is_number)
        .and_then(|number| serde_json::from_value(number).ok()))
}

/// Deserialize a text field. Numbers and booleans keep their textual form;
/// `null` and anything else become empty.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}
