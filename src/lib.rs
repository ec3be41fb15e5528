//! Metadata Extractor Service
//!
//! Event-driven file-metadata extraction for object-storage uploads. The
//! service consumes bucket upload notifications from Kafka, fetches each
//! uploaded object from S3-compatible storage, infers a small tag set from
//! its content (JSON or headered CSV), and writes one metadata record per
//! notification into a DynamoDB table.
//!
//! ## Behavior
//!
//! - **Suffix-based classification**: `.json` and `.csv` keys are inspected
//!   for `department`/`region` fields; anything else gets no tags
//! - **Degraded, never dropped**: a content parse failure produces a record
//!   with an `error` tag instead of skipping the file
//! - **Fail-fast batches**: the first store I/O failure aborts the rest of
//!   the batch; records already written stay written, and redelivery is the
//!   broker's responsibility
//!
//! ## Architecture
//!
//! ```text
//! Kafka Topic                  S3 Bucket                DynamoDB
//! ┌───────────────┐           ┌──────────────┐         ┌───────────────┐
//! │ upload        │           │ uploaded     │         │ file-metadata │
//! │ notifications │           │ objects      │         │ records       │
//! └───────────────┘           └──────────────┘         └───────────────┘
//!        │                           │                        ▲
//!        ▼                           ▼                        │
//! ┌───────────────┐           ┌──────────────┐         ┌───────────────┐
//! │ Upload Event  │──────────▶│ Metadata     │────────▶│ Record        │
//! │ Consumer      │  batches  │ Extractor    │ records │ Store         │
//! └───────────────┘           └──────────────┘         └───────────────┘
//!          (Dispatcher drives extract-then-store per notification)
//! ```

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod extractor;
pub mod object_store;
pub mod record_store;

pub use config::Config;
pub use consumer::UploadEventConsumer;
pub use dispatcher::{
    BatchError, BatchResponse, BatchStatus, Dispatcher, UploadBatch, UploadNotification,
    DEFAULT_CONTENT_TYPE,
};
pub use extractor::{FileFormat, MetadataExtractor, MetadataRecord, ParseError};
pub use object_store::{ObjectAttributes, ObjectStore, RetrievalError, S3ObjectStore};
pub use record_store::{DynamoRecordStore, RecordStore, StoreError};
