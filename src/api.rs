//! HTTP API handlers for Lectern.
//!
//! Handlers that need several independent reads issue them concurrently and
//! hand the joined results to the pure catalog and analytics functions. All
//! logging uses structured tracing; storage failures are logged with `warn!`
//! and surface as `500`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::aggregation::{build_dashboard, record_study_session};
use crate::catalog::{CategoryLookup, CourseQuery, apply_query};
use crate::model::{
    ActivityRequest, AnalyticsPatch, CatalogParams, CatalogResponse, Category, Course,
    DashboardResponse, EnrollRequest, Enrollment, LessonRequest, UserAnalytics,
};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
}

/// All routes, bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/courses", get(get_courses).post(post_course))
        .route("/categories", get(get_categories).post(post_category))
        .route(
            "/users/:user_id/enrollments",
            get(get_enrollments).post(post_enrollment),
        )
        .route(
            "/users/:user_id/enrollments/:course_id/lessons",
            post(post_lesson),
        )
        .route("/users/:user_id/activity", post(post_activity))
        .route("/users/:user_id/analytics", get(get_analytics))
        .route("/users/:user_id/dashboard", get(get_dashboard))
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

fn internal_error(e: anyhow::Error, context: &'static str) -> StatusCode {
    warn!(error = %e, "{context}");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// GET /courses - Search, filter and sort the catalog.
///
/// # Query Parameters
///
/// - `search`: case-insensitive text matched against title, description,
///   instructor, category name and language
/// - `category`, `difficulty`, `instructor`: exact facets (`all` disables)
/// - `duration`: `short`, `medium` or `long`
/// - `price`: `free` or `paid`
/// - `sort`: `newest` (default), `oldest`, `enrollmentAsc`, `enrollmentDesc`,
///   `ratingDesc`, `priceAsc`, `priceDesc`
#[instrument(skip(state))]
pub async fn get_courses(
    State(state): State<AppState>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CatalogResponse>, StatusCode> {
    let query = CourseQuery::from_params(&params);

    let (courses, categories) = tokio::try_join!(
        state.storage.fetch_courses(),
        state.storage.fetch_categories()
    )
    .map_err(|e| internal_error(e, "Failed to load catalog"))?;

    let lookup = CategoryLookup::new(&categories);
    let matched: Vec<Course> = apply_query(&courses, &query, &lookup)
        .into_iter()
        .cloned()
        .collect();

    info!(
        total = courses.len(),
        matched = matched.len(),
        sort = query.sort.as_str(),
        "Catalog queried"
    );

    Ok(Json(CatalogResponse {
        total_courses: courses.len(),
        matched: matched.len(),
        sort: query.sort,
        courses: matched,
    }))
}

/// POST /courses - Insert or replace a course document.
///
/// Returns `201 Created`, or `400` when the document has no id.
#[instrument(skip(state, course))]
pub async fn post_course(State(state): State<AppState>, Json(course): Json<Course>) -> StatusCode {
    if course.id.trim().is_empty() {
        warn!("Rejected course without id");
        return StatusCode::BAD_REQUEST;
    }

    match state.storage.upsert_course(&course).await {
        Ok(()) => {
            info!(course_id = %course.id, "Course saved");
            StatusCode::CREATED
        }
        Err(e) => internal_error(e, "Failed to save course"),
    }
}

/// GET /categories - List categories by name.
#[instrument(skip(state))]
pub async fn get_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, StatusCode> {
    let categories = state
        .storage
        .fetch_categories()
        .await
        .map_err(|e| internal_error(e, "Failed to load categories"))?;

    Ok(Json(categories))
}

/// POST /categories - Insert or rename a category.
#[instrument(skip(state))]
pub async fn post_category(
    State(state): State<AppState>,
    Json(category): Json<Category>,
) -> StatusCode {
    if category.id.trim().is_empty() {
        warn!("Rejected category without id");
        return StatusCode::BAD_REQUEST;
    }

    match state.storage.upsert_category(&category).await {
        Ok(()) => {
            info!(category_id = %category.id, name = %category.name, "Category saved");
            StatusCode::CREATED
        }
        Err(e) => internal_error(e, "Failed to save category"),
    }
}

/// GET /users/:user_id/enrollments - A user's enrollments.
#[instrument(skip(state))]
pub async fn get_enrollments(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Enrollment>>, StatusCode> {
    let enrollments = state
        .storage
        .fetch_user_enrollments(&user_id)
        .await
        .map_err(|e| internal_error(e, "Failed to load enrollments"))?;

    Ok(Json(enrollments))
}

/// POST /users/:user_id/enrollments - Enroll in a course.
///
/// Returns `201 Created` with the enrollment (the existing one when already
/// enrolled), or `404` for an unknown course.
#[instrument(skip(state))]
pub async fn post_enrollment(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<Enrollment>), StatusCode> {
    let course = state
        .storage
        .fetch_course(&request.course_id)
        .await
        .map_err(|e| internal_error(e, "Failed to load course"))?;

    if course.is_none() {
        warn!(course_id = %request.course_id, "Enrollment for unknown course");
        return Err(StatusCode::NOT_FOUND);
    }

    let enrollment = state
        .storage
        .enroll(&user_id, &request.course_id, Utc::now())
        .await
        .map_err(|e| internal_error(e, "Failed to enroll"))?;

    info!(
        user_id = %user_id,
        course_id = %request.course_id,
        "User enrolled"
    );

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// POST /users/:user_id/enrollments/:course_id/lessons - Complete a lesson.
///
/// Recomputes progress from `total_lessons`. The request that completes the
/// course also increments the user's completed-course count.
#[instrument(skip(state))]
pub async fn post_lesson(
    State(state): State<AppState>,
    Path((user_id, course_id)): Path<(String, String)>,
    Json(request): Json<LessonRequest>,
) -> Result<Json<Enrollment>, StatusCode> {
    if request.total_lessons == 0 || request.lesson_id.trim().is_empty() {
        warn!("Rejected lesson completion with no lessons");
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut enrollment = state
        .storage
        .fetch_enrollment(&user_id, &course_id)
        .await
        .map_err(|e| internal_error(e, "Failed to load enrollment"))?
        .ok_or(StatusCode::NOT_FOUND)?;

    let completed_now =
        enrollment.complete_lesson(&request.lesson_id, request.total_lessons, Utc::now());

    state
        .storage
        .save_enrollment(&enrollment)
        .await
        .map_err(|e| internal_error(e, "Failed to save enrollment"))?;

    if completed_now {
        let analytics = state
            .storage
            .fetch_user_analytics(&user_id)
            .await
            .map_err(|e| internal_error(e, "Failed to load analytics"))?
            .unwrap_or_default();

        let patch = AnalyticsPatch {
            courses_completed: Some(analytics.courses_completed.saturating_add(1)),
            ..Default::default()
        };

        state
            .storage
            .persist_analytics(&user_id, patch)
            .await
            .map_err(|e| internal_error(e, "Failed to record course completion"))?;

        info!(user_id = %user_id, course_id = %course_id, "Course completed");
    }

    info!(
        user_id = %user_id,
        course_id = %course_id,
        progress = enrollment.progress,
        "Lesson completed"
    );

    Ok(Json(enrollment))
}

/// POST /users/:user_id/activity - Record a study session.
///
/// # Request Body
///
/// ```json
/// {
///     "date": "2024-01-15",
///     "study_time": 1800,
///     "lessons_completed": 2,
///     "category": "programming"
/// }
/// ```
///
/// `date` defaults to today (UTC). A session with neither study time nor
/// lessons is rejected with `400`.
#[instrument(skip(state, request))]
pub async fn post_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ActivityRequest>,
) -> Result<Json<UserAnalytics>, StatusCode> {
    if request.study_time == 0 && request.lessons_completed == 0 {
        warn!(user_id = %user_id, "Rejected empty study session");
        return Err(StatusCode::BAD_REQUEST);
    }

    let session = request.into_session(Utc::now().date_naive());

    let mut analytics = state
        .storage
        .fetch_user_analytics(&user_id)
        .await
        .map_err(|e| internal_error(e, "Failed to load analytics"))?
        .unwrap_or_default();

    record_study_session(&mut analytics, &session);

    let analytics = state
        .storage
        .persist_analytics(&user_id, AnalyticsPatch::from(analytics))
        .await
        .map_err(|e| internal_error(e, "Failed to save analytics"))?;

    info!(
        user_id = %user_id,
        date = %session.date,
        study_time = session.study_time,
        streak = analytics.learning_streak,
        "Study session recorded"
    );

    Ok(Json(analytics))
}

/// GET /users/:user_id/analytics - The stored analytics record.
///
/// Returns `404` when the user has never recorded activity.
#[instrument(skip(state))]
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserAnalytics>, StatusCode> {
    match state.storage.fetch_user_analytics(&user_id).await {
        Ok(Some(analytics)) => Ok(Json(analytics)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(internal_error(e, "Failed to load analytics")),
    }
}

/// GET /users/:user_id/dashboard - Enrollment summary and learning insights.
///
/// Users with no analytics get neutral insights (engagement score 0).
#[instrument(skip(state))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DashboardResponse>, StatusCode> {
    let (enrollments, analytics, courses, categories) = tokio::try_join!(
        state.storage.fetch_user_enrollments(&user_id),
        state.storage.fetch_user_analytics(&user_id),
        state.storage.fetch_courses(),
        state.storage.fetch_categories()
    )
    .map_err(|e| internal_error(e, "Failed to load dashboard"))?;

    let dashboard = build_dashboard(
        &user_id,
        &enrollments,
        analytics.as_ref(),
        &courses,
        &categories,
        Utc::now(),
    );

    info!(
        user_id = %user_id,
        enrollments = dashboard.summary.total,
        engagement = dashboard.insights.engagement_score,
        "Dashboard queried"
    );

    Ok(Json(dashboard))
}
