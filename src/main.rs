//! Lectern - course catalog filtering and learning analytics.
//!
//! # API Endpoints
//!
//! - `GET /courses` - Search, filter and sort the catalog
//! - `POST /courses` - Insert or replace a course
//! - `GET|POST /categories` - List or save categories
//! - `GET|POST /users/:user_id/enrollments` - List enrollments or enroll
//! - `POST /users/:user_id/enrollments/:course_id/lessons` - Complete a lesson
//! - `POST /users/:user_id/activity` - Record a study session
//! - `GET /users/:user_id/analytics` - Stored analytics
//! - `GET /users/:user_id/dashboard` - Dashboard summary and insights
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lectern::api::{AppState, router};
use lectern::config::Config;
use lectern::data_sources::{DocumentStoreClient, import_catalog};
use lectern::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("lectern=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(port = config.port, db_url = %config.database_url, "Starting Lectern server");

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    // A failed import leaves the previously stored catalog in place.
    if let Some(catalog_url) = &config.catalog_url {
        let mut client = DocumentStoreClient::new(catalog_url);
        if let Some(token) = &config.catalog_token {
            client = client.with_auth_token(token);
        }

        if let Err(e) = import_catalog(&client, &storage).await {
            warn!(error = %e, catalog_url = %catalog_url, "Catalog import failed");
        }
    }

    let state = AppState { storage };

    let app = router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Lectern is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
