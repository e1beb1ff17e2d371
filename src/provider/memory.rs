//! In-memory broker for tests and single-process use
//!
//! Each topic is an append-only log. Readers in the same consumer group share
//! one offset, so a record is handed to exactly one member of each group.

use crate::config::{ReaderConfig, StartOffset, WriterConfig};
use crate::error::{EventError, Result};
use crate::provider::{Broker, BrokerReader, BrokerWriter};
use crate::types::Record;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Configuration for the in-memory broker
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Records retained per topic; oldest are dropped beyond this (0 = unlimited)
    pub max_records_per_topic: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_records_per_topic: 100_000,
        }
    }
}

struct TopicLog {
    /// Offset of `records[0]`
    base_offset: u64,
    records: Vec<Record>,
    /// Next offset to read, per consumer group
    groups: HashMap<String, u64>,
    /// Publishes the next write offset to waiting readers
    watermark: watch::Sender<u64>,
}

impl TopicLog {
    fn new() -> Self {
        let (watermark, _) = watch::channel(0);
        Self {
            base_offset: 0,
            records: Vec::new(),
            groups: HashMap::new(),
            watermark,
        }
    }

    fn end_offset(&self) -> u64 {
        self.base_offset + self.records.len() as u64
    }
}

struct Inner {
    config: MemoryConfig,
    topics: Mutex<HashMap<String, TopicLog>>,
}

impl Inner {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TopicLog>>> {
        self.topics
            .lock()
            .map_err(|e| EventError::Connection(format!("Memory broker lock poisoned: {}", e)))
    }

    fn append(&self, topic: &str, mut record: Record) -> Result<()> {
        let mut topics = self.lock()?;
        let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);

        record.topic = topic.to_string();
        log.records.push(record);

        let max = self.config.max_records_per_topic;
        if max > 0 && log.records.len() > max {
            let drain_count = log.records.len() - max;
            log.records.drain(..drain_count);
            log.base_offset += drain_count as u64;
        }

        log.watermark.send_replace(log.end_offset());
        Ok(())
    }

    fn join_group(
        &self,
        topic: &str,
        group: &str,
        start: StartOffset,
    ) -> Result<watch::Receiver<u64>> {
        let mut topics = self.lock()?;
        let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);

        let initial = match start {
            StartOffset::Latest => log.end_offset(),
            StartOffset::Earliest => log.base_offset,
        };
        log.groups.entry(group.to_string()).or_insert(initial);

        Ok(log.watermark.subscribe())
    }

    fn take_next(&self, topic: &str, group: &str) -> Result<Option<Record>> {
        let mut topics = self.lock()?;
        let Some(log) = topics.get_mut(topic) else {
            return Ok(None);
        };

        let base = log.base_offset;
        let end = log.end_offset();
        let offset = log.groups.entry(group.to_string()).or_insert(end);

        // Records below the retention window are gone
        if *offset < base {
            *offset = base;
        }
        if *offset >= end {
            return Ok(None);
        }

        let record = log.records[(*offset - base) as usize].clone();
        *offset += 1;
        Ok(Some(record))
    }
}

/// In-memory broker
///
/// Cheap to clone; clones share the same topics.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                topics: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Topics that have been written to or read from
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .map(|topics| topics.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Records currently retained for `topic`, oldest first
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.inner
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).map(|log| log.records.clone()))
            .unwrap_or_default()
    }

    /// Number of records retained for `topic`
    pub fn len(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).map(|log| log.records.len()))
            .unwrap_or(0)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn writer(&self, config: WriterConfig) -> Result<Box<dyn BrokerWriter>> {
        Ok(Box::new(MemoryWriter {
            inner: self.inner.clone(),
            topic: config.topic,
        }))
    }

    async fn reader(&self, config: ReaderConfig) -> Result<Box<dyn BrokerReader>> {
        let watermark = self
            .inner
            .join_group(&config.topic, &config.group_id, config.start_offset)?;

        tracing::debug!(
            topic = %config.topic,
            group = %config.group_id,
            "Memory reader opened"
        );

        Ok(Box::new(MemoryReader {
            inner: self.inner.clone(),
            topic: config.topic,
            group: config.group_id,
            max_wait: config.max_wait,
            watermark,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryWriter {
    inner: Arc<Inner>,
    topic: String,
}

#[async_trait]
impl BrokerWriter for MemoryWriter {
    async fn write(&mut self, ctx: &CancellationToken, record: Record) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(EventError::Cancelled);
        }
        self.inner.append(&self.topic, record)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MemoryReader {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    max_wait: Duration,
    watermark: watch::Receiver<u64>,
}

#[async_trait]
impl BrokerReader for MemoryReader {
    async fn read(&mut self, ctx: &CancellationToken) -> Result<Record> {
        loop {
            if ctx.is_cancelled() {
                return Err(EventError::Cancelled);
            }

            // Mark the current watermark seen before looking, so a write
            // landing after the check still wakes us.
            self.watermark.borrow_and_update();
            if let Some(record) = self.inner.take_next(&self.topic, &self.group)? {
                return Ok(record);
            }

            tokio::select! {
                _ = ctx.cancelled() => return Err(EventError::Cancelled),
                changed = tokio::time::timeout(self.max_wait, self.watermark.changed()) => {
                    if let Ok(Err(_)) = changed {
                        return Err(EventError::Read {
                            topic: self.topic.clone(),
                            reason: "topic closed".to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!(topic = %self.topic, group = %self.group, "Memory reader closed");
        Ok(())
    }
}
