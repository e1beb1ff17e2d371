//! Event construction and wire encoding

use crate::error::{EventError, Result};
use crate::types::{Event, PublishRequest, Record};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};

/// Consumer group shared by every subscription that names no group
pub const DEFAULT_GROUP_ID: &str = "*";

/// Build the event and its wire record from a publish request
///
/// The id is freshly generated on every call, never derived from content.
/// The returned record's topic is empty; writers address it per topic.
pub fn construct_event(request: &PublishRequest) -> Result<(Record, Event)> {
    let id = generate_id();
    let event = Event {
        id: id.clone(),
        event_name: request.event_name.clone(),
        namespace: request.namespace.clone(),
        client_id: request.client_id.clone(),
        trace_id: request.trace_id.clone(),
        span_context: request.span_context.clone(),
        user_id: request.user_id.clone(),
        session_id: request.session_id.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: request.version,
        event_id: request.event_id,
        event_type: request.event_type,
        event_level: request.event_level,
        service_name: request.service_name.clone(),
        client_ids: request.client_ids.clone(),
        target_user_ids: request.target_user_ids.clone(),
        target_namespace: request.target_namespace.clone(),
        privacy: request.privacy,
        additional_fields: request.additional_fields.clone(),
        payload: request.payload.clone(),
    };

    let value = encode_event(&event)?;

    Ok((
        Record {
            topic: String::new(),
            key: Bytes::from(id),
            value,
        },
        event,
    ))
}

/// Serialize an event envelope
pub fn encode_event(event: &Event) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

/// Deserialize a record value into an event
pub fn decode_event(value: &[u8]) -> Result<Event> {
    serde_json::from_slice(value).map_err(|e| EventError::Decode(e.to_string()))
}

/// Fully-qualified topic: `<prefix>.<topic>`, or the bare topic without a prefix
pub fn construct_topic(prefix: &str, topic: &str) -> String {
    if prefix.is_empty() {
        topic.to_string()
    } else {
        format!("{}.{}", prefix, topic)
    }
}

/// Fully-qualified consumer group; empty ids share `DEFAULT_GROUP_ID`
pub fn construct_group_id(group_id: &str) -> String {
    if group_id.is_empty() {
        DEFAULT_GROUP_ID.to_string()
    } else {
        group_id.to_string()
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
