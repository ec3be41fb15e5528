//! Metadata extraction from uploaded objects.
//!
//! Classifies an object by its key suffix, inspects the body as structured
//! text (JSON or headered CSV), and assembles the metadata record that gets
//! persisted. Content-level parse failures degrade to an `error` tag on the
//! record; only store I/O failures surface as errors.

use crate::object_store::{ObjectStore, RetrievalError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument};

/// Tag key for the department derived from file content
pub const TAG_DEPARTMENT: &str = "department";
/// Tag key for the region derived from file content
pub const TAG_REGION: &str = "region";
/// Tag key recording a content-level parse failure
pub const TAG_ERROR: &str = "error";
/// Tag value used when a field is absent from the content
pub const UNKNOWN_VALUE: &str = "unknown";

/// Content-level parse failure. The `Display` string is stored verbatim as
/// the record's `error` tag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid JSON format")]
    Json,

    #[error("Invalid CSV format")]
    Csv,
}

/// File format classified from the object key suffix. Classification is
/// suffix-based only, case-sensitive, with no content sniffing fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Csv,
    Other,
}

impl FileFormat {
    /// Classify a storage key by its exact suffix
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(".json") {
            FileFormat::Json
        } else if key.ends_with(".csv") {
            FileFormat::Csv
        } else {
            FileFormat::Other
        }
    }
}

/// The persisted metadata record, exactly one per processed notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Identifier, equal to the object's storage key
    pub file_id: String,
    /// Record-creation instant. Together with `file_id` this forms the
    /// record's composite identity; reprocessing the same key yields a new
    /// record rather than overwriting.
    pub timestamp: DateTime<Utc>,
    /// Byte length as reported by the store at read time
    pub size: i64,
    /// Store-reported last-modification instant
    pub last_modified: DateTime<Utc>,
    /// Declared MIME type from the triggering notification
    pub content_type: String,
    /// Derived string tags (`department`, `region`, `error`)
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Derive tags from an object body according to its classified format.
///
/// Objects outside the two known formats get no tags at all.
pub fn infer_tags(format: FileFormat, body: &str) -> HashMap<String, String> {
    match format {
        FileFormat::Json => json_tags(body),
        FileFormat::Csv => csv_tags(body),
        FileFormat::Other => HashMap::new(),
    }
}

fn json_tags(body: &str) -> HashMap<String, String> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "Failed to parse JSON content");
            return parse_failure(ParseError::Json);
        }
    };

    let mut tags = HashMap::new();
    tags.insert(TAG_DEPARTMENT.to_string(), string_field(&value, TAG_DEPARTMENT));
    tags.insert(TAG_REGION.to_string(), string_field(&value, TAG_REGION));
    tags
}

/// Top-level string field, defaulting when the value is not an object with
/// such a string field
fn string_field(value: &serde_json::Value, field: &str) -> String {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or(UNKNOWN_VALUE)
        .to_string()
}

fn csv_tags(body: &str) -> HashMap<String, String> {
    // Flexible: a short first row defaults its missing columns instead of
    // failing the whole body.
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            error!(error = %e, "Failed to parse CSV content");
            return parse_failure(ParseError::Csv);
        }
    };

    // Only the first data row feeds the tags. A header with zero data rows
    // is not an error: both fields default.
    let first_row = match reader.records().next() {
        Some(Ok(row)) => Some(row),
        Some(Err(e)) => {
            error!(error = %e, "Failed to parse CSV content");
            return parse_failure(ParseError::Csv);
        }
        None => None,
    };

    let mut tags = HashMap::new();
    for field in [TAG_DEPARTMENT, TAG_REGION] {
        let value = headers
            .iter()
            .position(|h| h == field)
            .and_then(|i| first_row.as_ref().and_then(|row| row.get(i)))
            .unwrap_or(UNKNOWN_VALUE);
        tags.insert(field.to_string(), value.to_string());
    }
    tags
}

fn parse_failure(error: ParseError) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert(TAG_ERROR.to_string(), error.to_string());
    tags
}

/// Metadata extractor over an object store
pub struct MetadataExtractor {
    store: Arc<dyn ObjectStore>,
}

impl MetadataExtractor {
    /// Create a new extractor reading from the given object store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Retrieve one object's attributes and body and assemble its record
    /// with a freshly generated creation timestamp.
    #[instrument(skip(self))]
    pub async fn extract(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<MetadataRecord, RetrievalError> {
        let attributes = self.store.fetch_attributes(bucket, key).await?;
        let body = self.store.fetch_text(bucket, key).await?;

        let format = FileFormat::from_key(key);
        let tags = infer_tags(format, &body);

        debug!(
            format = ?format,
            size = attributes.size,
            tag_count = tags.len(),
            "Derived tags from object content"
        );

        Ok(MetadataRecord {
            file_id: key.to_string(),
            timestamp: Utc::now(),
            size: attributes.size,
            last_modified: attributes.last_modified,
            content_type: content_type.to_string(),
            tags,
        })
    }
}
