//! Persistence of metadata records.
//!
//! Every write is an unconditional insert into a table keyed by
//! (`file_id`, `timestamp`); there is no conditional write, no retry, and no
//! update or delete path. Repeated uploads of the same key create new
//! records under fresh timestamps.

use crate::config::DynamoDbConfig;
use crate::extractor::MetadataRecord;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_types::region::Region;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write metadata record for {file_id}: {message}")]
    Write { file_id: String, message: String },
}

/// Write access to the metadata record store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record. Exactly one new record becomes visible in the
    /// store per successful call.
    async fn put(&self, record: &MetadataRecord) -> Result<(), StoreError>;
}

/// Record store backed by a DynamoDB table
pub struct DynamoRecordStore {
    client: DynamoClient,
    table: String,
}

impl DynamoRecordStore {
    /// Create a new DynamoDB-backed record store
    pub async fn new(config: &DynamoDbConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut dynamo_config_builder = DynamoConfigBuilder::from(&aws_config);

        // Configure custom endpoint for DynamoDB Local/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            dynamo_config_builder = dynamo_config_builder.endpoint_url(endpoint_url);
        }

        let client = DynamoClient::from_conf(dynamo_config_builder.build());

        info!(
            table = %config.table,
            region = %config.region,
            "DynamoDB record store initialized"
        );

        Ok(Self {
            client,
            table: config.table.clone(),
        })
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    #[instrument(skip(self, record), fields(file_id = %record.file_id))]
    async fn put(&self, record: &MetadataRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_item(record)))
            .send()
            .await
            .map_err(|e| StoreError::Write {
                file_id: record.file_id.clone(),
                message: e.to_string(),
            })?;

        debug!(table = %self.table, "Stored metadata record");
        metrics::counter!("metadata.records.stored").increment(1);

        Ok(())
    }
}

/// Flatten a record into a DynamoDB item.
///
/// `file_id` is the hash key and `timestamp` the range key; timestamps are
/// written as ISO-8601 UTC strings.
fn record_item(record: &MetadataRecord) -> HashMap<String, AttributeValue> {
    let tags = record
        .tags
        .iter()
        .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
        .collect();

    HashMap::from([
        (
            "file_id".to_string(),
            AttributeValue::S(record.file_id.clone()),
        ),
        (
            "timestamp".to_string(),
            AttributeValue::S(record.timestamp.to_rfc3339()),
        ),
        ("size".to_string(), AttributeValue::N(record.size.to_string())),
        (
            "last_modified".to_string(),
            AttributeValue::S(record.last_modified.to_rfc3339()),
        ),
        (
            "content_type".to_string(),
            AttributeValue::S(record.content_type.clone()),
        ),
        ("tags".to_string(), AttributeValue::M(tags)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample_record() -> MetadataRecord {
        let mut tags = HashMap::new();
        tags.insert("department".to_string(), "finance".to_string());
        tags.insert("region".to_string(), "west".to_string());

        MetadataRecord {
            file_id: "test.json".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(),
            size: 48,
            last_modified: Utc.with_ymd_and_hms(2024, 3, 10, 8, 15, 0).unwrap(),
            content_type: "application/json".to_string(),
            tags,
        }
    }

    #[test]
    fn test_record_item_keys_and_scalars() {
        let item = record_item(&sample_record());

        assert_eq!(item["file_id"].as_s().unwrap(), "test.json");
        assert_eq!(item["timestamp"].as_s().unwrap(), "2024-03-10T09:00:00+00:00");
        assert_eq!(item["size"].as_n().unwrap(), "48");
        assert_eq!(
            item["last_modified"].as_s().unwrap(),
            "2024-03-10T08:15:00+00:00"
        );
        assert_eq!(item["content_type"].as_s().unwrap(), "application/json");
    }

    #[test]
    fn test_record_item_tags_map() {
        let item = record_item(&sample_record());

        let tags = item["tags"].as_m().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["department"].as_s().unwrap(), "finance");
        assert_eq!(tags["region"].as_s().unwrap(), "west");
    }

    #[test]
    fn test_record_item_empty_tags() {
        let mut record = sample_record();
        record.tags.clear();

        let item = record_item(&record);
        assert!(item["tags"].as_m().unwrap().is_empty());
    }
}
