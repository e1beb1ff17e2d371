//! NATS JetStream client: connect, open writers and readers

use super::config::{durable_name, NatsConfig};
use super::reader::NatsReader;
use crate::config::{ReaderConfig, StartOffset, WriterConfig};
use crate::error::{EventError, Result};
use crate::provider::BrokerWriter;
use crate::types::Record;
use async_nats::jetstream;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Header carrying the record key across the broker
pub(crate) const KEY_HEADER: &str = "Eventstream-Key";

/// NATS JetStream client
///
/// Owns the connection and the stream every topic is stored in.
pub struct NatsClient {
    /// NATS client connection
    client: async_nats::Client,

    /// JetStream context
    jetstream: jetstream::Context,

    /// JetStream stream handle
    stream: Mutex<jetstream::stream::Stream>,

    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = config
            .connect_options()
            .connect(&config.url)
            .await
            .map_err(|e| EventError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            stream: Mutex::new(stream),
            config: Arc::new(config),
        })
    }

    /// Writer publishing to `config.topic`
    pub fn open_writer(&self, config: WriterConfig) -> NatsWriter {
        NatsWriter {
            jetstream: self.jetstream.clone(),
            topic: config.topic,
            write_timeout: config
                .write_timeout
                .unwrap_or(Duration::from_secs(self.config.request_timeout_secs)),
        }
    }

    /// Reader backed by a durable pull consumer for the group and topic
    pub async fn open_reader(&self, config: ReaderConfig) -> Result<NatsReader> {
        let name = durable_name(&config.group_id, &config.topic);
        let deliver_policy = match config.start_offset {
            StartOffset::Latest => jetstream::consumer::DeliverPolicy::New,
            StartOffset::Earliest => jetstream::consumer::DeliverPolicy::All,
        };

        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(
                &name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: config.topic.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    deliver_policy,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EventError::Read {
                topic: config.topic.clone(),
                reason: format!("failed to create consumer '{}': {}", name, e),
            })?;

        let messages = consumer
            .stream()
            .max_bytes_per_batch(config.max_bytes)
            .messages()
            .await
            .map_err(|e| EventError::Read {
                topic: config.topic.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            consumer = %name,
            topic = %config.topic,
            group = %config.group_id,
            "Durable reader created"
        );

        Ok(NatsReader::new(messages, config.topic, config.max_wait))
    }

    /// Delete the durable consumer behind a group's reader
    pub async fn delete_group(&self, group_id: &str, topic: &str) -> Result<()> {
        let name = durable_name(group_id, topic);
        self.stream
            .lock()
            .await
            .delete_consumer(&name)
            .await
            .map_err(|e| EventError::Config(format!(
                "Failed to delete consumer '{}': {}",
                name, e
            )))?;

        tracing::info!(consumer = %name, "Consumer deleted");
        Ok(())
    }

    /// Get the underlying NATS client
    pub fn nats_client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Publishes records to one subject
pub struct NatsWriter {
    jetstream: jetstream::Context,
    topic: String,
    write_timeout: Duration,
}

impl NatsWriter {
    async fn publish(&self, record: Record) -> Result<()> {
        let mut headers = async_nats::HeaderMap::new();

        if let Ok(key) = std::str::from_utf8(&record.key) {
            if !key.is_empty() {
                // The stream dedups on Nats-Msg-Id, and one event fans out to
                // several subjects of the same stream.
                let msg_id = format!("{}:{}", self.topic, key);
                headers.insert("Nats-Msg-Id", msg_id.as_str());
                headers.insert(KEY_HEADER, key);
            }
        }

        let ack_fut = self
            .jetstream
            .publish_with_headers(self.topic.clone(), headers, record.value)
            .await
            .map_err(|e| EventError::Publish {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;

        let ack = ack_fut.await.map_err(|e| EventError::Publish {
            topic: self.topic.clone(),
            reason: format!("ack failed: {}", e),
        })?;

        tracing::debug!(topic = %self.topic, sequence = ack.sequence, "Record written");
        Ok(())
    }
}

#[async_trait]
impl BrokerWriter for NatsWriter {
    async fn write(&mut self, ctx: &CancellationToken, record: Record) -> Result<()> {
        let timeout = self.write_timeout;
        tokio::select! {
            _ = ctx.cancelled() => Err(EventError::Cancelled),
            result = tokio::time::timeout(timeout, self.publish(record)) => {
                result.map_err(|_| EventError::Timeout(format!(
                    "Write to '{}' timed out after {:?}",
                    self.topic, timeout
                )))?
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Create the stream if missing; an existing stream is used as is
async fn ensure_stream(
    js: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let stream = js
        .get_or_create_stream(config.stream_config())
        .await
        .map_err(|e| {
            EventError::Connection(format!("stream '{}' unavailable: {}", config.stream_name, e))
        })?;

    tracing::info!(
        stream = %config.stream_name,
        subjects = ?config.stream_subjects(),
        duplicate_window_secs = config.duplicate_window_secs,
        "Event stream ready"
    );

    Ok(stream)
}
