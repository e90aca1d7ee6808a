//! Remote data sources for the course catalog.
//!
//! # Data Sources
//!
//! - [`document_store`]: the hosted document database that owns courses and
//!   categories
//!
//! [`import_catalog`] copies the remote catalog into local [`Storage`] so the
//! API can serve it without a network round trip per request.

pub mod document_store;

pub use document_store::DocumentStoreClient;

use serde::Serialize;
use tracing::{info, warn};

use crate::model::{Category, Course};
use crate::storage::Storage;

/// Counts from one catalog import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub courses: usize,
    pub categories: usize,
    pub skipped: usize,
}

/// Copy the remote courses and categories into local storage.
///
/// Both collections are fetched concurrently; nothing is written unless both
/// reads succeed.
pub async fn import_catalog(
    client: &DocumentStoreClient,
    storage: &Storage,
) -> anyhow::Result<ImportSummary> {
    let (courses, categories) =
        tokio::try_join!(client.fetch_courses(), client.fetch_categories())?;

    store_catalog(storage, &courses, &categories).await
}

/// Upsert fetched catalog documents. Documents without an id are skipped.
pub async fn store_catalog(
    storage: &Storage,
    courses: &[Course],
    categories: &[Category],
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for category in categories {
        if category.id.is_empty() {
            warn!(name = %category.name, "Skipping category without id");
            summary.skipped += 1;
            continue;
        }
        storage.upsert_category(category).await?;
        summary.categories += 1;
    }

    for course in courses {
        if course.id.is_empty() {
            warn!(title = %course.title, "Skipping course without id");
            summary.skipped += 1;
            continue;
        }
        storage.upsert_course(course).await?;
        summary.courses += 1;
    }

    info!(
        courses = summary.courses,
        categories = summary.categories,
        skipped = summary.skipped,
        "Catalog imported"
    );

    Ok(summary)
}
