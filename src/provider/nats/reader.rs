//! Pull-consumer reader for one topic and group

use super::client::KEY_HEADER;
use crate::error::{EventError, Result};
use crate::provider::BrokerReader;
use crate::types::Record;
use async_nats::jetstream::consumer::pull;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reads records from a durable pull consumer
pub struct NatsReader {
    messages: pull::Stream,
    topic: String,
    max_wait: Duration,
}

impl NatsReader {
    pub(crate) fn new(messages: pull::Stream, topic: String, max_wait: Duration) -> Self {
        Self {
            messages,
            topic,
            max_wait,
        }
    }

    fn read_error(&self, reason: impl Into<String>) -> EventError {
        EventError::Read {
            topic: self.topic.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl BrokerReader for NatsReader {
    async fn read(&mut self, ctx: &CancellationToken) -> Result<Record> {
        loop {
            let next = tokio::select! {
                _ = ctx.cancelled() => return Err(EventError::Cancelled),
                next = tokio::time::timeout(self.max_wait, self.messages.next()) => next,
            };

            let message = match next {
                // Poll window elapsed with nothing new
                Err(_) => continue,
                Ok(None) => return Err(self.read_error("consumer stream ended")),
                Ok(Some(Err(e))) => return Err(self.read_error(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            message
                .ack()
                .await
                .map_err(|e| self.read_error(format!("ack failed: {}", e)))?;

            let key = message
                .headers
                .as_ref()
                .and_then(|headers| headers.get(KEY_HEADER))
                .map(|value| Bytes::copy_from_slice(value.as_str().as_bytes()))
                .unwrap_or_default();

            return Ok(Record {
                topic: message.subject.to_string(),
                key,
                value: message.payload.clone(),
            });
        }
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!(topic = %self.topic, "NATS reader closed");
        Ok(())
    }
}
