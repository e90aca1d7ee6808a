//! Client for the hosted document database that owns the course catalog.
//!
//! The store exposes each collection over REST at
//! `{base_url}/{collection}.json`, optionally authenticated with an `auth`
//! query parameter. A collection comes back either as an object keyed by
//! document id or as an array (with `null` holes where documents were
//! deleted).

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{Category, Course};

/// Collection holding course documents.
pub const COURSES_COLLECTION: &str = "courses";

/// Collection holding category documents.
pub const CATEGORIES_COLLECTION: &str = "categories";

/// Client for reading collections from the remote document store.
#[derive(Clone)]
pub struct DocumentStoreClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl DocumentStoreClient {
    /// Create a client for the store at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    /// Authenticate every request with `token`.
    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// REST URL of a collection.
    pub fn collection_url(&self, collection: &str) -> String {
        let mut url = format!("{}/{}.json", self.base_url, urlencoding::encode(collection));
        if let Some(token) = &self.auth_token {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    /// Fetch the raw documents of a collection.
    pub async fn fetch_collection(&self, collection: &str) -> anyhow::Result<Vec<Value>> {
        let response = self
            .client
            .get(self.collection_url(collection))
            .send()
            .await?
            .error_for_status()?;

        let body = response.json::<Value>().await?;
        let documents = collection_documents(body);

        debug!(collection, count = documents.len(), "Fetched collection");
        Ok(documents)
    }

    pub async fn fetch_courses(&self) -> anyhow::Result<Vec<Course>> {
        let documents = self.fetch_collection(COURSES_COLLECTION).await?;
        Ok(parse_documents(COURSES_COLLECTION, documents))
    }

    pub async fn fetch_categories(&self) -> anyhow::Result<Vec<Category>> {
        let documents = self.fetch_collection(CATEGORIES_COLLECTION).await?;
        Ok(parse_documents(CATEGORIES_COLLECTION, documents))
    }
}

/// Flatten a collection body into its documents.
///
/// Keyed collections lend their key as `id` to documents that lack one.
/// Anything that is not an object is dropped.
pub fn collection_documents(body: Value) -> Vec<Value> {
    match body {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(key, doc)| match doc {
                Value::Object(mut fields) => {
                    let has_id = fields
                        .get("id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| !id.is_empty());
                    if !has_id {
                        fields.insert("id".to_string(), Value::String(key));
                    }
                    Some(Value::Object(fields))
                }
                _ => None,
            })
            .collect(),
        Value::Array(items) => items.into_iter().filter(Value::is_object).collect(),
        _ => Vec::new(),
    }
}

/// Deserialize documents, skipping the ones that don't fit `T`.
pub fn parse_documents<T: DeserializeOwned>(collection: &str, documents: Vec<Value>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<T>(doc) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(collection, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}
