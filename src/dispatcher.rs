//! Batch dispatch of upload notifications.
//!
//! One dispatcher invocation handles one ordered batch: for each
//! notification it extracts a metadata record and writes it to the record
//! store, strictly sequentially. The first retrieval or store failure aborts
//! the remainder of the batch; records already written stay written.

use crate::extractor::MetadataExtractor;
use crate::object_store::RetrievalError;
use crate::record_store::{RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Declared content type used when a notification carries none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One object-storage upload notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadNotification {
    /// Bucket/container identifier
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
    /// Declared MIME type, if any
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Ordered sequence of notifications delivered to one dispatcher invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadBatch {
    pub records: Vec<UploadNotification>,
}

/// Outcome of one batch invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Failure,
}

/// Response surfaced to the caller: a status indicator and a human-readable
/// message, with no per-notification detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: BatchStatus,
    pub message: String,
}

impl BatchResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: BatchStatus::Success,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: BatchStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }
}

/// Failure that aborts a batch
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sequential dispatcher over the extractor and the record store
pub struct Dispatcher {
    extractor: MetadataExtractor,
    record_store: Arc<dyn RecordStore>,
}

impl Dispatcher {
    /// Create a new dispatcher from its two collaborators
    pub fn new(extractor: MetadataExtractor, record_store: Arc<dyn RecordStore>) -> Self {
        Self {
            extractor,
            record_store,
        }
    }

    /// Process a batch strictly in the order received.
    ///
    /// There is no retry and no rollback: a failure response means
    /// notifications before the failing one were already durably written.
    #[instrument(skip(self, batch), fields(batch_size = batch.records.len()))]
    pub async fn handle(&self, batch: &UploadBatch) -> BatchResponse {
        for notification in &batch.records {
            info!(
                bucket = %notification.bucket,
                key = %notification.key,
                "Processing file"
            );

            if let Err(e) = self.process(notification).await {
                error!(
                    bucket = %notification.bucket,
                    key = %notification.key,
                    error = %e,
                    "Aborting batch"
                );
                metrics::counter!("metadata.batches.failed").increment(1);
                return BatchResponse::failure(format!("Error processing files: {e}"));
            }

            info!(key = %notification.key, "Successfully processed file");
        }

        metrics::counter!("metadata.batches.completed").increment(1);
        BatchResponse::success("Successfully processed files")
    }

    async fn process(&self, notification: &UploadNotification) -> Result<(), BatchError> {
        let content_type = notification
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let record = self
            .extractor
            .extract(&notification.bucket, &notification.key, content_type)
            .await?;

        self.record_store.put(&record).await?;

        metrics::counter!("metadata.notifications.processed").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{MetadataRecord, TAG_DEPARTMENT, TAG_ERROR, TAG_REGION};
    use crate::object_store::{MockObjectStore, ObjectAttributes};
    use crate::record_store::MockRecordStore;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn notification(key: &str, content_type: Option<&str>) -> UploadNotification {
        UploadNotification {
            bucket: "test-bucket".to_string(),
            key: key.to_string(),
            content_type: content_type.map(String::from),
        }
    }

    fn attributes() -> ObjectAttributes {
        ObjectAttributes {
            size: 100,
            last_modified: Utc.with_ymd_and_hms(2024, 3, 10, 8, 15, 0).unwrap(),
        }
    }

    /// Record store double that collects every inserted record
    fn collecting_store(sink: Arc<Mutex<Vec<MetadataRecord>>>) -> MockRecordStore {
        let mut store = MockRecordStore::new();
        store.expect_put().returning(move |record| {
            sink.lock().unwrap().push(record.clone());
            Ok(())
        });
        store
    }

    #[tokio::test]
    async fn test_batch_success_stores_one_record_per_notification() {
        let mut object_store = MockObjectStore::new();
        object_store
            .expect_fetch_attributes()
            .times(2)
            .returning(|_, _| Ok(attributes()));
        object_store
            .expect_fetch_text()
            .times(2)
            .returning(|_, _| Ok(r#"{"department":"finance","region":"west"}"#.to_string()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let record_store = collecting_store(stored.clone());

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![
                notification("a.json", Some("application/json")),
                notification("b.json", Some("application/json")),
            ],
        };

        let response = dispatcher.handle(&batch).await;
        assert!(response.is_success());
        assert_eq!(response.message, "Successfully processed files");

        let records = stored.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_id, "a.json");
        assert_eq!(records[1].file_id, "b.json");
        assert_eq!(records[0].tags[TAG_DEPARTMENT], "finance");
        assert_eq!(records[0].tags[TAG_REGION], "west");
    }

    #[tokio::test]
    async fn test_parse_failure_still_stores_a_record() {
        let mut object_store = MockObjectStore::new();
        object_store
            .expect_fetch_attributes()
            .returning(|_, _| Ok(attributes()));
        object_store
            .expect_fetch_text()
            .returning(|_, _| Ok("invalid json content".to_string()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let record_store = collecting_store(stored.clone());

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![notification("test.json", Some("application/json"))],
        };

        let response = dispatcher.handle(&batch).await;
        assert!(response.is_success());

        let records = stored.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags[TAG_ERROR], "Invalid JSON format");
        assert!(!records[0].tags.contains_key(TAG_DEPARTMENT));
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults() {
        let mut object_store = MockObjectStore::new();
        object_store
            .expect_fetch_attributes()
            .returning(|_, _| Ok(attributes()));
        object_store
            .expect_fetch_text()
            .returning(|_, _| Ok(String::new()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let record_store = collecting_store(stored.clone());

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![notification("notes.txt", None)],
        };

        let response = dispatcher.handle(&batch).await;
        assert!(response.is_success());

        let records = stored.lock().unwrap();
        assert_eq!(records[0].content_type, DEFAULT_CONTENT_TYPE);
        assert!(records[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure_aborts_batch() {
        let mut object_store = MockObjectStore::new();
        // Only the first notification is ever fetched
        object_store
            .expect_fetch_attributes()
            .times(1)
            .returning(|_, key| {
                Err(RetrievalError::Attributes {
                    key: key.to_string(),
                    message: "object not found".to_string(),
                })
            });
        object_store.expect_fetch_text().times(0);

        let mut record_store = MockRecordStore::new();
        record_store.expect_put().times(0);

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![
                notification("missing.json", Some("application/json")),
                notification("never-reached.json", Some("application/json")),
            ],
        };

        let response = dispatcher.handle(&batch).await;
        assert_eq!(response.status, BatchStatus::Failure);
        assert!(response.message.starts_with("Error processing files:"));
        assert!(response.message.contains("object not found"));
    }

    #[tokio::test]
    async fn test_failure_after_first_success_keeps_earlier_record() {
        let mut object_store = MockObjectStore::new();
        let mut fetched = 0u32;
        object_store
            .expect_fetch_attributes()
            .times(2)
            .returning(move |_, key| {
                fetched += 1;
                if fetched == 1 {
                    Ok(attributes())
                } else {
                    Err(RetrievalError::Attributes {
                        key: key.to_string(),
                        message: "object not found".to_string(),
                    })
                }
            });
        object_store
            .expect_fetch_text()
            .times(1)
            .returning(|_, _| Ok(r#"{"department":"finance","region":"west"}"#.to_string()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let record_store = collecting_store(stored.clone());

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![
                notification("present.json", Some("application/json")),
                notification("missing.json", Some("application/json")),
            ],
        };

        let response = dispatcher.handle(&batch).await;
        assert_eq!(response.status, BatchStatus::Failure);

        // The first notification's record was written and stays written
        let records = stored.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_id, "present.json");
    }

    #[tokio::test]
    async fn test_store_failure_aborts_batch_after_earlier_write() {
        let mut object_store = MockObjectStore::new();
        object_store
            .expect_fetch_attributes()
            .times(2)
            .returning(|_, _| Ok(attributes()));
        object_store
            .expect_fetch_text()
            .times(2)
            .returning(|_, _| Ok(String::new()));

        // First write lands, second is throttled; the third notification
        // must never be reached.
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut record_store = MockRecordStore::new();
        record_store.expect_put().times(2).returning(move |record| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(())
            } else {
                Err(StoreError::Write {
                    file_id: record.file_id.clone(),
                    message: "throughput exceeded".to_string(),
                })
            }
        });

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![
                notification("a.txt", None),
                notification("b.txt", None),
                notification("c.txt", None),
            ],
        };

        let response = dispatcher.handle(&batch).await;
        assert_eq!(response.status, BatchStatus::Failure);
        assert!(response.message.contains("throughput exceeded"));
    }

    #[tokio::test]
    async fn test_repeated_handling_inserts_new_records() {
        let mut object_store = MockObjectStore::new();
        object_store
            .expect_fetch_attributes()
            .returning(|_, _| Ok(attributes()));
        object_store
            .expect_fetch_text()
            .returning(|_, _| Ok(r#"{"department":"finance","region":"west"}"#.to_string()));

        let stored = Arc::new(Mutex::new(Vec::new()));
        let record_store = collecting_store(stored.clone());

        let dispatcher = Dispatcher::new(
            MetadataExtractor::new(Arc::new(object_store)),
            Arc::new(record_store),
        );

        let batch = UploadBatch {
            records: vec![notification("test.json", Some("application/json"))],
        };

        // No deduplication: the same notification handled twice inserts twice
        assert!(dispatcher.handle(&batch).await.is_success());
        assert!(dispatcher.handle(&batch).await.is_success());

        let records = stored.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_id, records[1].file_id);
    }

    #[test]
    fn test_batch_status_serialization() {
        assert_eq!(
            serde_json::to_string(&BatchStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&BatchStatus::Failure).unwrap(),
            "\"failure\""
        );
    }

    #[test]
    fn test_notification_deserialization_without_content_type() {
        let json = r#"{"bucket":"test-bucket","key":"test.csv"}"#;
        let notification: UploadNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.bucket, "test-bucket");
        assert_eq!(notification.key, "test.csv");
        assert!(notification.content_type.is_none());
    }
}
