//! NATS JetStream broker
//!
//! Implements `Broker` on a single JetStream stream. Topics are subjects,
//! consumer groups are durable pull consumers.

mod client;
mod config;
mod reader;

pub use client::{NatsClient, NatsWriter};
pub use config::{durable_name, NatsConfig, StorageType};
pub use reader::NatsReader;

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::provider::{Broker, BrokerReader, BrokerWriter};
use async_trait::async_trait;

/// NATS JetStream broker
///
/// Wraps `NatsClient` and implements the `Broker` trait.
pub struct NatsBroker {
    client: NatsClient,
}

impl NatsBroker {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying NATS client for advanced usage
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn writer(&self, config: WriterConfig) -> Result<Box<dyn BrokerWriter>> {
        Ok(Box::new(self.client.open_writer(config)))
    }

    async fn reader(&self, config: ReaderConfig) -> Result<Box<dyn BrokerReader>> {
        let reader = self.client.open_reader(config).await?;
        Ok(Box::new(reader))
    }

    fn name(&self) -> &str {
        "nats"
    }
}
