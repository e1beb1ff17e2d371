//! Broker adapter traits: the seam between the client and a log broker
//!
//! A broker hands out short-lived writers (one per write) and long-lived
//! readers (one per subscription). Partitioning, rebalancing and offset
//! commits stay inside the implementation.

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::Result;
use crate::types::Record;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub mod nats;

/// Core trait for broker backends
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a writer bound to `config.topic`
    async fn writer(&self, config: WriterConfig) -> Result<Box<dyn BrokerWriter>>;

    /// Open a reader for `config.topic` as a member of `config.group_id`
    async fn reader(&self, config: ReaderConfig) -> Result<Box<dyn BrokerReader>>;

    /// Provider name (e.g., "memory", "nats")
    fn name(&self) -> &str;
}

/// Writes records to one topic
#[async_trait]
pub trait BrokerWriter: Send {
    /// Write one record; `ctx` may abort the write
    async fn write(&mut self, ctx: &CancellationToken, record: Record) -> Result<()>;

    /// Release the writer
    async fn close(&mut self) -> Result<()>;
}

/// Reads records from one topic for one consumer group
#[async_trait]
pub trait BrokerReader: Send {
    /// Block until the next record arrives
    ///
    /// Returns `EventError::Cancelled` when `ctx` is cancelled first.
    async fn read(&mut self, ctx: &CancellationToken) -> Result<Record>;

    /// Release the reader
    async fn close(&mut self) -> Result<()>;
}
