//! Course catalog filtering and sorting.
//!
//! Everything here is a pure function over an already-fetched list of
//! courses. Filter criteria live in an immutable [`CourseQuery`]; changing a
//! selection produces a new query value. Neither [`filter_courses`] nor
//! [`sort_courses`] touches its input: both return a new vector of borrowed
//! courses.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{CatalogParams, Category, Course, CourseDuration, Difficulty};

/// Longest course, in minutes, that still counts as short.
pub const SHORT_MAX_MINUTES: f64 = 120.0;

/// Longest course, in minutes, that still counts as medium.
pub const MEDIUM_MAX_MINUTES: f64 = 360.0;

/// Read-only category id to name table.
///
/// An id with no known name stands for itself, so courses whose `category`
/// already holds a name resolve unchanged.
#[derive(Debug, Clone, Default)]
pub struct CategoryLookup {
    names: HashMap<String, String>,
}

impl CategoryLookup {
    pub fn new(categories: &[Category]) -> Self {
        let names = categories
            .iter()
            .filter(|c| !c.id.is_empty() && !c.name.is_empty())
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();

        Self { names }
    }

    /// The display name for a category id, or the id itself.
    pub fn name_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.names.get(id).map_or(id, String::as_str)
    }
}

/// Coarse course length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationBucket {
    Short,
    Medium,
    Long,
}

impl DurationBucket {
    pub fn from_minutes(minutes: f64) -> Self {
        if minutes <= SHORT_MAX_MINUTES {
            DurationBucket::Short
        } else if minutes <= MEDIUM_MAX_MINUTES {
            DurationBucket::Medium
        } else {
            DurationBucket::Long
        }
    }

    /// Bucket for a course. Missing or unparseable durations are short.
    pub fn for_course(course: &Course) -> Self {
        course
            .duration
            .as_ref()
            .and_then(duration_minutes)
            .map_or(DurationBucket::Short, Self::from_minutes)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "short" => Some(DurationBucket::Short),
            "medium" => Some(DurationBucket::Medium),
            "long" => Some(DurationBucket::Long),
            _ => None,
        }
    }
}

/// Minutes in a stored duration.
///
/// `"H:MM"` strings are hours and minutes; any other string must be a plain
/// number of minutes.
pub fn duration_minutes(duration: &CourseDuration) -> Option<f64> {
    match duration {
        CourseDuration::Minutes(m) => m.is_finite().then_some(*m),
        CourseDuration::Text(text) => {
            let text = text.trim();
            match text.split_once(':') {
                Some((hours, minutes)) => {
                    let hours: u32 = hours.trim().parse().ok()?;
                    let minutes: u32 = minutes.trim().parse().ok()?;
                    Some(f64::from(hours) * 60.0 + f64::from(minutes))
                }
                None => text.parse::<f64>().ok().filter(|m| m.is_finite()),
            }
        }
    }
}

/// Free or paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFilter {
    Free,
    Paid,
}

impl PriceFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PriceFilter::Free),
            "paid" => Some(PriceFilter::Paid),
            _ => None,
        }
    }

    pub fn matches(&self, course: &Course) -> bool {
        match self {
            PriceFilter::Free => is_free(course),
            PriceFilter::Paid => !is_free(course),
        }
    }
}

/// A course is free when it has no price, a zero price, or a NaN price.
pub fn is_free(course: &Course) -> bool {
    course.price.is_none_or(|p| p == 0.0 || p.is_nan())
}

/// Catalog ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    EnrollmentAsc,
    EnrollmentDesc,
    RatingDesc,
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    /// Accepts camelCase, kebab-case or snake_case. Unknown keys are `Newest`.
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "oldest" => SortKey::Oldest,
            "enrollmentasc" => SortKey::EnrollmentAsc,
            "enrollmentdesc" => SortKey::EnrollmentDesc,
            "ratingdesc" => SortKey::RatingDesc,
            "priceasc" => SortKey::PriceAsc,
            "pricedesc" => SortKey::PriceDesc,
            _ => SortKey::Newest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::Oldest => "oldest",
            SortKey::EnrollmentAsc => "enrollmentAsc",
            SortKey::EnrollmentDesc => "enrollmentDesc",
            SortKey::RatingDesc => "ratingDesc",
            SortKey::PriceAsc => "priceAsc",
            SortKey::PriceDesc => "priceDesc",
        }
    }
}

impl From<String> for SortKey {
    fn from(raw: String) -> Self {
        SortKey::parse(&raw)
    }
}

/// Catalog search and filter selections.
///
/// A `None` facet is inactive. Active facets are AND-combined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseQuery {
    /// Lowercased search term.
    pub search: Option<String>,
    /// Category name.
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub duration: Option<DurationBucket>,
    pub instructor: Option<String>,
    pub price: Option<PriceFilter>,
    pub sort: SortKey,
}

impl CourseQuery {
    /// Build a query from raw selections, where `"all"` or empty disables a facet.
    pub fn from_params(params: &CatalogParams) -> Self {
        Self {
            search: facet(params.search.as_deref()).map(|s| s.to_lowercase()),
            category: facet(params.category.as_deref()),
            difficulty: facet(params.difficulty.as_deref()),
            duration: facet(params.duration.as_deref()).and_then(|d| DurationBucket::parse(&d)),
            instructor: facet(params.instructor.as_deref()),
            price: facet(params.price.as_deref()).and_then(|p| PriceFilter::parse(&p)),
            sort: params.sort.as_deref().map(SortKey::parse).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn with_search(self, term: &str) -> Self {
        Self {
            search: facet(Some(term)).map(|s| s.to_lowercase()),
            ..self
        }
    }

    #[must_use]
    pub fn with_category(self, category: &str) -> Self {
        Self {
            category: facet(Some(category)),
            ..self
        }
    }

    #[must_use]
    pub fn with_difficulty(self, difficulty: &str) -> Self {
        Self {
            difficulty: facet(Some(difficulty)),
            ..self
        }
    }

    #[must_use]
    pub fn with_duration(self, duration: Option<DurationBucket>) -> Self {
        Self { duration, ..self }
    }

    #[must_use]
    pub fn with_instructor(self, instructor: &str) -> Self {
        Self {
            instructor: facet(Some(instructor)),
            ..self
        }
    }

    #[must_use]
    pub fn with_price(self, price: Option<PriceFilter>) -> Self {
        Self { price, ..self }
    }

    #[must_use]
    pub fn with_sort(self, sort: SortKey) -> Self {
        Self { sort, ..self }
    }

    /// Whether a course passes every active facet.
    pub fn matches(&self, course: &Course, categories: &CategoryLookup) -> bool {
        let category_name = categories.name_for(&course.category);

        if let Some(term) = &self.search {
            let hit = [
                course.title.as_str(),
                course.description.as_str(),
                course.instructor.as_str(),
                category_name,
                course.language.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(term.as_str()));

            if !hit {
                return false;
            }
        }

        if self.category.as_deref().is_some_and(|c| c != category_name) {
            return false;
        }

        // A course without a difficulty never matches a difficulty facet.
        if self.difficulty.as_deref().is_some_and(|d| {
            course.difficulty == Difficulty::Unset
                || !course.difficulty.as_str().eq_ignore_ascii_case(d)
        }) {
            return false;
        }

        if self
            .duration
            .is_some_and(|bucket| DurationBucket::for_course(course) != bucket)
        {
            return false;
        }

        if self
            .instructor
            .as_deref()
            .is_some_and(|i| course.instructor != i)
        {
            return false;
        }

        self.price.is_none_or(|p| p.matches(course))
    }
}

fn facet(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        .map(str::to_string)
}

/// Courses passing every active facet of `query`, in input order.
pub fn filter_courses<'a, I>(
    courses: I,
    query: &CourseQuery,
    categories: &CategoryLookup,
) -> Vec<&'a Course>
where
    I: IntoIterator<Item = &'a Course>,
{
    courses
        .into_iter()
        .filter(|course| query.matches(course, categories))
        .collect()
}

/// A stably sorted copy of `courses`.
///
/// Missing enrollment counts, ratings and prices compare as 0; missing or
/// unparseable creation dates compare as the epoch.
pub fn sort_courses<'a, I>(courses: I, key: SortKey) -> Vec<&'a Course>
where
    I: IntoIterator<Item = &'a Course>,
{
    let mut sorted: Vec<&Course> = courses.into_iter().collect();

    match key {
        SortKey::Newest => sorted.sort_by_cached_key(|c| Reverse(c.created_at.timestamp_millis())),
        SortKey::Oldest => sorted.sort_by_cached_key(|c| c.created_at.timestamp_millis()),
        SortKey::EnrollmentAsc => sorted.sort_by_key(|c| c.enrollment_count.unwrap_or(0)),
        SortKey::EnrollmentDesc => sorted.sort_by_key(|c| Reverse(c.enrollment_count.unwrap_or(0))),
        SortKey::RatingDesc => sorted.sort_by(|a, b| number(b.rating).total_cmp(&number(a.rating))),
        SortKey::PriceAsc => sorted.sort_by(|a, b| number(a.price).total_cmp(&number(b.price))),
        SortKey::PriceDesc => sorted.sort_by(|a, b| number(b.price).total_cmp(&number(a.price))),
    }

    sorted
}

fn number(value: Option<f64>) -> f64 {
    value.filter(|v| !v.is_nan()).unwrap_or(0.0)
}

/// Filter, then sort by the query's sort key.
pub fn apply_query<'a>(
    courses: &'a [Course],
    query: &CourseQuery,
    categories: &CategoryLookup,
) -> Vec<&'a Course> {
    sort_courses(filter_courses(courses, query, categories), query.sort)
}
