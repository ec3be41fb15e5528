//! Kafka intake for upload notifications.
//!
//! S3-compatible stores publish bucket notifications as JSON documents with
//! a `Records` array. Each Kafka message carries one such document, which
//! maps to one dispatcher batch. Offsets are committed only after a success
//! response, so redelivery of failed batches stays with the broker.

use crate::config::KafkaConfig;
use crate::dispatcher::{Dispatcher, UploadBatch, UploadNotification};
use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Bucket-notification document as published by S3-compatible stores
#[derive(Debug, Deserialize)]
pub struct NotificationDocument {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

/// One entry of the `Records` array
#[derive(Debug, Deserialize)]
pub struct NotificationRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
}

impl From<NotificationDocument> for UploadBatch {
    fn from(document: NotificationDocument) -> Self {
        let records = document
            .records
            .into_iter()
            .map(|record| UploadNotification {
                bucket: record.s3.bucket.name,
                key: record.s3.object.key,
                content_type: record.s3.object.content_type,
            })
            .collect();

        UploadBatch { records }
    }
}

/// Kafka consumer feeding upload-notification batches to the dispatcher
pub struct UploadEventConsumer {
    consumer: StreamConsumer,
    dispatcher: Arc<Dispatcher>,
}

impl UploadEventConsumer {
    /// Create a new consumer subscribed to the upload-events topic
    pub fn new(config: &KafkaConfig, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set(
                "max.poll.interval.ms",
                config.max_poll_interval_ms.to_string(),
            );

        // Configure SSL if enabled
        if config.ssl_enabled {
            client_config.set("security.protocol", "SASL_SSL");
            if let Some(ref ca_location) = config.ssl_ca_location {
                client_config.set("ssl.ca.location", ca_location);
            }
        }

        // Configure SASL if credentials provided
        if let (Some(ref username), Some(ref password)) =
            (&config.sasl_username, &config.sasl_password)
        {
            client_config
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.upload_events_topic])
            .context("Failed to subscribe to upload events topic")?;

        info!(
            topic = %config.upload_events_topic,
            group = %config.consumer_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer,
            dispatcher,
        })
    }

    /// Start consuming and dispatching notification documents
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!("Starting upload event consumer");

        let mut message_stream = self.consumer.stream();

        while let Some(message_result) = message_stream.next().await {
            match message_result {
                Ok(message) => self.handle_message(&message).await,
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("metadata.kafka.errors").increment(1);
                }
            }
        }

        Ok(())
    }

    /// Dispatch one notification document and commit its offset on success
    async fn handle_message(&self, message: &BorrowedMessage<'_>) {
        let batch = match decode_batch(message.payload()) {
            Ok(batch) => batch,
            Err(e) => {
                error!(
                    error = %e,
                    partition = message.partition(),
                    offset = message.offset(),
                    "Failed to decode notification message"
                );
                metrics::counter!("metadata.messages.undecodable").increment(1);
                return;
            }
        };

        let response = self.dispatcher.handle(&batch).await;

        if response.is_success() {
            if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
                warn!(error = %e, "Failed to commit offset");
            }
            metrics::counter!("metadata.messages.processed").increment(1);
        } else {
            error!(
                message = %response.message,
                partition = message.partition(),
                offset = message.offset(),
                "Batch failed; offset left uncommitted for redelivery"
            );
            metrics::counter!("metadata.messages.failed").increment(1);
        }
    }
}

fn decode_batch(payload: Option<&[u8]>) -> Result<UploadBatch> {
    let payload = payload.context("Message has no payload")?;

    let document: NotificationDocument = serde_json::from_slice(payload)
        .context("Failed to deserialize notification document")?;

    Ok(document.into())
}
