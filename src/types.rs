//! Core event types for the a3s-eventstream system
//!
//! `Event` is the envelope carried as a record's value. Its JSON field names
//! are fixed for wire compatibility with other producers on the same topics.

use crate::error::{EventError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Event envelope transmitted on the wire
///
/// Every field is optional on decode; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Unique identifier, freshly generated per construction
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "name", skip_serializing_if = "String::is_empty")]
    pub event_name: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(rename = "clientId", skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    #[serde(rename = "traceId", skip_serializing_if = "String::is_empty")]
    pub trace_id: String,

    #[serde(rename = "spanContext", skip_serializing_if = "String::is_empty")]
    pub span_context: String,

    #[serde(rename = "userId", skip_serializing_if = "String::is_empty")]
    pub user_id: String,

    #[serde(rename = "sessionId", skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    /// Construction time, UTC, RFC 3339 (e.g. `2024-05-01T08:30:00Z`)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,

    /// Envelope schema version
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub version: u32,

    #[serde(rename = "event_id", skip_serializing_if = "is_zero_i32")]
    pub event_id: i32,

    #[serde(rename = "event_type", skip_serializing_if = "is_zero_i32")]
    pub event_type: i32,

    #[serde(rename = "event_level", skip_serializing_if = "is_zero_i32")]
    pub event_level: i32,

    #[serde(rename = "service", skip_serializing_if = "String::is_empty")]
    pub service_name: String,

    #[serde(rename = "client_ids", skip_serializing_if = "Vec::is_empty")]
    pub client_ids: Vec<String>,

    #[serde(rename = "target_user_ids", skip_serializing_if = "Vec::is_empty")]
    pub target_user_ids: Vec<String>,

    #[serde(rename = "target_namespace", skip_serializing_if = "String::is_empty")]
    pub target_namespace: String,

    #[serde(skip_serializing_if = "is_false")]
    pub privacy: bool,

    #[serde(rename = "additional_fields", skip_serializing_if = "Map::is_empty")]
    pub additional_fields: Map<String, Value>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A key/value record as exchanged with the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Fully-qualified topic the record was written to or read from
    pub topic: String,

    /// Record key (the event id)
    pub key: Bytes,

    /// Encoded event envelope
    pub value: Bytes,
}

/// Invoked once per topic whose delivery exhausted all retries
pub type ErrorCallback = Arc<dyn Fn(Event, EventError) + Send + Sync>;

/// Invoked per matching record, and once with `Err(EventError::Cancelled)`
/// when the subscription's context is cancelled
pub type SubscribeCallback = Arc<dyn Fn(Result<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Description of an event to publish to one or more topics
#[derive(Clone, Default)]
pub struct PublishRequest {
    pub topics: Vec<String>,
    pub event_name: String,
    pub namespace: String,
    pub client_id: String,
    pub user_id: String,
    pub trace_id: String,
    pub span_context: String,
    pub session_id: String,
    pub version: u32,
    pub event_id: i32,
    pub event_type: i32,
    pub event_level: i32,
    pub service_name: String,
    pub client_ids: Vec<String>,
    pub target_user_ids: Vec<String>,
    pub target_namespace: String,
    pub privacy: bool,
    pub additional_fields: Map<String, Value>,
    pub payload: Map<String, Value>,

    /// Receives the event and final error when a topic's delivery gives up
    pub error_callback: Option<ErrorCallback>,

    /// Execution context handed to every broker write
    pub context: CancellationToken,
}

impl PublishRequest {
    /// Start a request for the given event name
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    /// Add a target topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Replace the target topics
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_span_context(mut self, span_context: impl Into<String>) -> Self {
        self.span_context = span_context.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_event_id(mut self, event_id: i32) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_event_type(mut self, event_type: i32) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_event_level(mut self, event_level: i32) -> Self {
        self.event_level = event_level;
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_client_ids(mut self, client_ids: Vec<String>) -> Self {
        self.client_ids = client_ids;
        self
    }

    pub fn with_target_user_ids(mut self, target_user_ids: Vec<String>) -> Self {
        self.target_user_ids = target_user_ids;
        self
    }

    pub fn with_target_namespace(mut self, target_namespace: impl Into<String>) -> Self {
        self.target_namespace = target_namespace.into();
        self
    }

    pub fn with_privacy(mut self, privacy: bool) -> Self {
        self.privacy = privacy;
        self
    }

    /// Add a free-form additional field
    pub fn with_additional_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_fields.insert(key.into(), value);
        self
    }

    /// Set the payload from a JSON object
    ///
    /// Non-object values are stored under a single `"value"` key.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Set the callback invoked when delivery to a topic gives up
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(Event, EventError) + Send + Sync + 'static,
    {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("topics", &self.topics)
            .field("event_name", &self.event_name)
            .field("namespace", &self.namespace)
            .field("client_id", &self.client_id)
            .field("has_error_callback", &self.error_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// A request to consume a topic and dispatch matching events to a callback
#[derive(Clone)]
pub struct SubscribeRequest {
    pub topic: String,

    /// Event-name filter; empty matches every event on the topic
    pub event_name: String,

    /// Consumer group; empty uses the shared default group
    ///
    /// Every subscription without a group shares one group per topic, so
    /// records are split between them regardless of their event-name
    /// filters. A record handed to a subscription whose filter skips it is
    /// not offered to the others. Name a group to receive every record.
    pub group_id: String,

    pub callback: SubscribeCallback,

    /// Cancelling this token is the only way to stop the subscription
    pub context: CancellationToken,
}

impl SubscribeRequest {
    /// Create a request for `topic`, dispatching to an async callback
    pub fn new<F, Fut>(topic: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Result<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            topic: topic.into(),
            event_name: String::new(),
            group_id: String::new(),
            callback: Arc::new(move |delivery| callback(delivery).boxed()),
            context: CancellationToken::new(),
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Debug for SubscribeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeRequest")
            .field("topic", &self.topic)
            .field("event_name", &self.event_name)
            .field("group_id", &self.group_id)
            .field("cancelled", &self.context.is_cancelled())
            .finish_non_exhaustive()
    }
}
