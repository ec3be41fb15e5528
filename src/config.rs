//! Configuration for the metadata extractor service.
//!
//! All external collaborators (Kafka, object store, record table) are
//! configured through one explicit structure loaded at startup and passed
//! down to the components that need it.

use serde::Deserialize;

/// Main configuration for the metadata extractor service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// Object store configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Metadata record table configuration
    #[serde(default)]
    pub dynamodb: DynamoDbConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Kafka consumer configuration for the upload-event intake
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying bucket upload notifications
    #[serde(default = "default_upload_events_topic")]
    pub upload_events_topic: String,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Max poll interval in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u32,
}

/// Object store configuration. The bucket is not configured here: every
/// notification names its own bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Metadata record table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoDbConfig {
    /// Table holding metadata records, keyed by (file_id, timestamp)
    #[serde(default = "default_table")]
    pub table: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for DynamoDB Local, LocalStack, etc.)
    pub endpoint_url: Option<String>,
}

// Default value functions
fn default_service_name() -> String {
    "metadata-extractor".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_consumer_group() -> String {
    "metadata-extractor".to_string()
}

fn default_upload_events_topic() -> String {
    "storage.upload-events".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_max_poll_interval_ms() -> u32 {
    300000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_table() -> String {
    "file-metadata".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/metadata").required(false))
            .add_source(config::File::with_name("/etc/metadata-extractor/metadata").required(false))
            // Override with environment variables
            // METADATA__KAFKA__BOOTSTRAP_SERVERS -> kafka.bootstrap_servers
            .add_source(
                config::Environment::with_prefix("METADATA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
        }
    }
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_region(), "us-east-1");
        assert_eq!(default_table(), "file-metadata");
        assert_eq!(default_upload_events_topic(), "storage.upload-events");
    }

    #[test]
    fn test_store_sections_default() {
        let s3 = S3Config::default();
        assert_eq!(s3.region, "us-east-1");
        assert!(s3.endpoint_url.is_none());
        assert!(!s3.force_path_style);

        let dynamodb = DynamoDbConfig::default();
        assert_eq!(dynamodb.table, "file-metadata");
        assert_eq!(dynamodb.region, "us-east-1");
    }
}
