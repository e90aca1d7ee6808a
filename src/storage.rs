//! SQLite storage layer for Lectern.
//!
//! Courses and analytics are kept as JSON documents, the same shape the
//! upstream document store uses, so fields the engine does not know about
//! survive a round trip. Categories and enrollments are plain rows.
//!
//! Timestamps are stored as unix milliseconds.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite};
use tracing::warn;

use crate::model::{AnalyticsPatch, Category, Course, Enrollment, UserAnalytics};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:lectern.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database is its own database, so
        // keep exactly one and never let it expire.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                progress INTEGER NOT NULL,
                completed_lessons TEXT NOT NULL,
                enrolled_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL,
                completed_at INTEGER,
                certificate_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_enrollments_user
            ON enrollments(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_analytics (
                user_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a course document.
    pub async fn upsert_course(&self, course: &Course) -> anyhow::Result<()> {
        anyhow::ensure!(!course.id.is_empty(), "course id must not be empty");

        let doc = serde_json::to_string(course)?;

        sqlx::query(
            r#"
            INSERT INTO courses (id, doc, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at
            "#,
        )
        .bind(&course.id)
        .bind(doc)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All courses, ordered by id.
    ///
    /// A document that no longer parses is skipped with a warning rather than
    /// failing the whole catalog.
    pub async fn fetch_courses(&self) -> anyhow::Result<Vec<Course>> {
        let rows = sqlx::query(
            r#"
            SELECT id, doc FROM courses ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(course_from_row).collect())
    }

    pub async fn fetch_course(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        let row = sqlx::query(
            r#"
            SELECT id, doc FROM courses WHERE id = ?
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(course_from_row))
    }

    /// Insert or rename a category.
    pub async fn upsert_category(&self, category: &Category) -> anyhow::Result<()> {
        anyhow::ensure!(!category.id.is_empty(), "category id must not be empty");

        sqlx::query(
            r#"
            INSERT INTO categories (id, name)
            VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All categories, ordered by name.
    pub async fn fetch_categories(&self) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name FROM categories ORDER BY name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Category {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    /// Enroll a user in a course.
    ///
    /// Enrolling twice returns the existing enrollment unchanged. The course's
    /// `enrollmentCount` is bumped only when a new enrollment is created.
    pub async fn enroll(
        &self,
        user_id: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Enrollment> {
        let mut tx = self.pool.begin().await?;

        let id = Enrollment::enrollment_id(user_id, course_id);
        if let Some(existing) = fetch_enrollment_by_id(&mut *tx, &id).await? {
            tx.commit().await?;
            return Ok(existing);
        }

        let enrollment = Enrollment::new(user_id, course_id, now);
        write_enrollment(&mut *tx, &enrollment).await?;

        sqlx::query(
            r#"
            UPDATE courses
            SET doc = json_set(doc, '$.enrollmentCount',
                               COALESCE(json_extract(doc, '$.enrollmentCount'), 0) + 1)
            WHERE id = ?
            "#,
        )
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(enrollment)
    }

    /// Insert or replace an enrollment.
    pub async fn save_enrollment(&self, enrollment: &Enrollment) -> anyhow::Result<()> {
        write_enrollment(&self.pool, enrollment).await
    }

    pub async fn fetch_enrollment(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> anyhow::Result<Option<Enrollment>> {
        fetch_enrollment_by_id(&self.pool, &Enrollment::enrollment_id(user_id, course_id)).await
    }

    /// A user's enrollments, oldest first.
    pub async fn fetch_user_enrollments(&self, user_id: &str) -> anyhow::Result<Vec<Enrollment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM enrollments
            WHERE user_id = ?
            ORDER BY enrolled_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    /// A user's analytics record, if one was ever written.
    pub async fn fetch_user_analytics(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Option<UserAnalytics>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM user_analytics WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let doc: String = row.get("doc");
                Ok(Some(serde_json::from_str(&doc)?))
            }
            None => Ok(None),
        }
    }

    /// Apply a partial update to a user's analytics, creating the record if
    /// needed. Concurrent writers are not coordinated: the last write wins.
    pub async fn persist_analytics(
        &self,
        user_id: &str,
        patch: AnalyticsPatch,
    ) -> anyhow::Result<UserAnalytics> {
        let mut analytics = self.fetch_user_analytics(user_id).await?.unwrap_or_default();
        patch.apply(&mut analytics);

        sqlx::query(
            r#"
            INSERT INTO user_analytics (user_id, doc, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(&analytics)?)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(analytics)
    }
}

fn course_from_row(row: &SqliteRow) -> Option<Course> {
    let id: String = row.get("id");
    let doc: String = row.get("doc");

    match serde_json::from_str::<Course>(&doc) {
        Ok(mut course) => {
            if course.id.is_empty() {
                course.id = id;
            }
            Some(course)
        }
        Err(e) => {
            warn!(course_id = %id, error = %e, "Skipping unreadable course document");
            None
        }
    }
}

async fn fetch_enrollment_by_id<'e, E>(executor: E, id: &str) -> anyhow::Result<Option<Enrollment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT * FROM enrollments WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(enrollment_from_row).transpose()
}

async fn write_enrollment<'e, E>(executor: E, enrollment: &Enrollment) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO enrollments (
            id, user_id, course_id, progress, completed_lessons,
            enrolled_at, last_accessed, completed_at, certificate_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            progress = excluded.progress,
            completed_lessons = excluded.completed_lessons,
            last_accessed = excluded.last_accessed,
            completed_at = excluded.completed_at,
            certificate_id = excluded.certificate_id
        "#,
    )
    .bind(&enrollment.id)
    .bind(&enrollment.user_id)
    .bind(&enrollment.course_id)
    .bind(i64::from(enrollment.progress))
    .bind(serde_json::to_string(&enrollment.completed_lessons)?)
    .bind(enrollment.enrolled_at.timestamp_millis())
    .bind(enrollment.last_accessed.timestamp_millis())
    .bind(enrollment.completed_at.map(|t| t.timestamp_millis()))
    .bind(&enrollment.certificate_id)
    .execute(executor)
    .await?;

    Ok(())
}

fn enrollment_from_row(row: &SqliteRow) -> anyhow::Result<Enrollment> {
    let progress: i64 = row.get("progress");
    let completed_lessons: String = row.get("completed_lessons");
    let completed_at: Option<i64> = row.get("completed_at");

    Ok(Enrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        progress: progress.clamp(0, 100) as u8,
        completed_lessons: serde_json::from_str(&completed_lessons)?,
        enrolled_at: from_millis(row.get("enrolled_at")),
        last_accessed: from_millis(row.get("last_accessed")),
        completed_at: completed_at.map(from_millis),
        certificate_id: row.get("certificate_id"),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
