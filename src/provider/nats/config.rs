//! NATS JetStream broker configuration

use async_nats::jetstream::stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where JetStream keeps stream data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Configuration for `NatsBroker`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// JetStream stream holding every topic
    pub stream_name: String,

    /// Subject prefix captured by the stream (`<prefix>.>`)
    ///
    /// Must match the client's topic prefix so fully-qualified topics land
    /// in the stream.
    pub subject_prefix: String,

    pub storage: StorageType,

    /// Maximum records retained (-1 = unlimited)
    pub max_events: i64,

    /// Maximum record age in seconds (0 = unlimited)
    pub max_age_secs: u64,

    /// Maximum stream size in bytes (-1 = unlimited)
    pub max_bytes: i64,

    /// Window in which the stream drops a repeated message id, so a write
    /// retried after a lost ack is stored once
    pub duplicate_window_secs: u64,

    pub connect_timeout_secs: u64,

    /// Also bounds each write's wait for its ack unless the client sets a
    /// write timeout
    pub request_timeout_secs: u64,

    /// Connection name shown in server monitoring
    pub connection_name: String,

    /// Optional auth token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "EVENTSTREAM".to_string(),
            subject_prefix: "events".to_string(),
            storage: StorageType::File,
            max_events: 100_000,
            max_age_secs: 604_800,
            max_bytes: -1,
            duplicate_window_secs: 120,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            connection_name: "a3s-eventstream".to_string(),
            token: None,
        }
    }
}

impl NatsConfig {
    /// Subjects bound to the stream
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![format!("{}.>", self.subject_prefix)]
    }

    /// Stream definition for every topic under `subject_prefix`
    pub fn stream_config(&self) -> stream::Config {
        stream::Config {
            name: self.stream_name.clone(),
            subjects: self.stream_subjects(),
            storage: match self.storage {
                StorageType::File => stream::StorageType::File,
                StorageType::Memory => stream::StorageType::Memory,
            },
            max_messages: self.max_events,
            max_age: Duration::from_secs(self.max_age_secs),
            max_bytes: self.max_bytes,
            duplicate_window: Duration::from_secs(self.duplicate_window_secs),
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        }
    }

    /// Connection options: timeouts, name and optional token
    pub fn connect_options(&self) -> async_nats::ConnectOptions {
        let opts = async_nats::ConnectOptions::new()
            .name(&self.connection_name)
            .connection_timeout(Duration::from_secs(self.connect_timeout_secs))
            .request_timeout(Some(Duration::from_secs(self.request_timeout_secs)));

        match &self.token {
            Some(token) => opts.token(token.clone()),
            None => opts,
        }
    }
}

/// Durable consumer name for a group on a topic
///
/// JetStream names allow only `[A-Za-z0-9_-]`. Each part keeps ASCII
/// alphanumerics and writes every other byte as `_XX` (hex), so parts never
/// contain `-` and distinct pairs never share a name.
pub fn durable_name(group_id: &str, topic: &str) -> String {
    format!("{}-{}", escape_name(group_id), escape_name(topic))
}

fn escape_name(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{:02X}", byte));
        }
    }
    escaped
}
