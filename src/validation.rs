//! Request validation
//!
//! Publish and subscribe requests are checked before anything touches the
//! broker. Validation never mutates the request.

use crate::error::{EventError, Result};
use crate::types::{PublishRequest, SubscribeRequest};

const MAX_EVENT_NAME_LEN: usize = 256;
const MAX_TOPIC_LEN: usize = 249;

/// Validate a publish request
///
/// Always requires a well-formed event name and at least one well-formed
/// topic. With `strict` enabled, namespace, client id and trace id must be
/// present, and client/user/session ids must be UUIDs when set.
pub fn validate_publish_event(request: &PublishRequest, strict: bool) -> Result<()> {
    validate_event_name("eventName", &request.event_name)?;

    if request.topics.is_empty() {
        return Err(EventError::validation("topic", "at least one topic is required"));
    }
    for topic in &request.topics {
        validate_topic("topic", topic)?;
    }

    if strict {
        require("namespace", &request.namespace)?;
        require("clientId", &request.client_id)?;
        require("traceId", &request.trace_id)?;

        validate_uuid("clientId", &request.client_id)?;
        validate_uuid("userId", &request.user_id)?;
        validate_uuid("sessionId", &request.session_id)?;
    }

    Ok(())
}

/// Validate a subscribe request
pub fn validate_subscribe_event(request: &SubscribeRequest) -> Result<()> {
    validate_topic("topic", &request.topic)?;

    if !request.event_name.is_empty() {
        validate_event_name("eventName", &request.event_name)?;
    }

    if !request.group_id.is_empty() && !request.group_id.chars().all(is_topic_char) {
        return Err(EventError::validation(
            "groupId",
            "only ASCII letters, digits, '_', '.' and '-' are allowed",
        ));
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EventError::validation(field, "required in strict mode"));
    }
    Ok(())
}

fn validate_event_name(field: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(EventError::validation(field, "must not be empty")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(EventError::validation(field, "must start with a letter"));
        }
        Some(_) => {}
    }

    if name.len() > MAX_EVENT_NAME_LEN {
        return Err(EventError::validation(
            field,
            format!("longer than {} characters", MAX_EVENT_NAME_LEN),
        ));
    }

    if !chars.all(is_topic_char) {
        return Err(EventError::validation(
            field,
            "only ASCII letters, digits, '_', '.' and '-' are allowed",
        ));
    }

    Ok(())
}

fn validate_topic(field: &str, topic: &str) -> Result<()> {
    let mut chars = topic.chars();
    match chars.next() {
        None => return Err(EventError::validation(field, "must not be empty")),
        Some(first) if !first.is_ascii_alphanumeric() => {
            return Err(EventError::validation(
                field,
                format!("'{}' must start with a letter or digit", topic),
            ));
        }
        Some(_) => {}
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err(EventError::validation(
            field,
            format!("'{}' is longer than {} characters", topic, MAX_TOPIC_LEN),
        ));
    }

    if !chars.all(is_topic_char) {
        return Err(EventError::validation(
            field,
            format!("'{}' contains characters outside [A-Za-z0-9_.-]", topic),
        ));
    }

    Ok(())
}

// Empty values pass; presence is checked separately.
fn validate_uuid(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|e| EventError::validation(field, format!("not a valid UUID: {}", e)))
}

fn is_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Event;

    fn valid_request() -> PublishRequest {
        PublishRequest::new("orderCreated").with_topic("orders")
    }

    fn field_of(err: EventError) -> String {
        match err {
            EventError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_minimal_request_passes_lenient() {
        assert!(validate_publish_event(&valid_request(), false).is_ok());
    }

    #[test]
    fn test_empty_event_name_rejected() {
        let req = PublishRequest::new("").with_topic("orders");
        let err = validate_publish_event(&req, false).unwrap_err();
        assert_eq!(field_of(err), "eventName");
    }

    #[test]
    fn test_event_name_must_start_with_letter() {
        let req = PublishRequest::new("1abc").with_topic("orders");
        assert!(validate_publish_event(&req, false).is_err());

        let req = PublishRequest::new("order created").with_topic("orders");
        assert!(validate_publish_event(&req, false).is_err());
    }

    #[test]
    fn test_missing_topic_rejected() {
        let req = PublishRequest::new("orderCreated");
        let err = validate_publish_event(&req, false).unwrap_err();
        assert_eq!(field_of(err), "topic");
    }

    #[test]
    fn test_bad_topic_rejected() {
        for bad in ["", "-orders", "orders/eu", "orders eu"] {
            let req = PublishRequest::new("orderCreated").with_topic(bad);
            assert!(validate_publish_event(&req, false).is_err(), "topic {:?}", bad);
        }

        let long = "t".repeat(MAX_TOPIC_LEN + 1);
        let req = PublishRequest::new("orderCreated").with_topic(long);
        assert!(validate_publish_event(&req, false).is_err());
    }

    #[test]
    fn test_strict_requires_namespace_client_and_trace() {
        let req = valid_request();
        assert_eq!(field_of(validate_publish_event(&req, true).unwrap_err()), "namespace");

        let req = valid_request().with_namespace("game");
        assert_eq!(field_of(validate_publish_event(&req, true).unwrap_err()), "clientId");

        let req = valid_request()
            .with_namespace("game")
            .with_client_id(uuid::Uuid::new_v4().simple().to_string());
        assert_eq!(field_of(validate_publish_event(&req, true).unwrap_err()), "traceId");
    }

    #[test]
    fn test_strict_checks_uuid_shapes() {
        let base = valid_request()
            .with_namespace("game")
            .with_client_id(uuid::Uuid::new_v4().simple().to_string())
            .with_trace_id("trace-1");
        assert!(validate_publish_event(&base, true).is_ok());

        let req = base.clone().with_user_id("not-a-uuid");
        assert_eq!(field_of(validate_publish_event(&req, true).unwrap_err()), "userId");

        let req = base
            .clone()
            .with_session_id(uuid::Uuid::new_v4().hyphenated().to_string());
        assert!(validate_publish_event(&req, true).is_ok());

        // Lenient mode does not look at id shapes
        let req = base.with_user_id("not-a-uuid");
        assert!(validate_publish_event(&req, false).is_ok());
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let req = valid_request().with_namespace("game");
        let before = format!("{:?}", req);
        let _ = validate_publish_event(&req, true);
        assert_eq!(before, format!("{:?}", req));
    }

    fn subscribe(topic: &str) -> SubscribeRequest {
        SubscribeRequest::new(topic, |_: Result<Event>| async {})
    }

    #[test]
    fn test_subscribe_validation() {
        assert!(validate_subscribe_event(&subscribe("orders")).is_ok());
        assert!(validate_subscribe_event(&subscribe("orders").with_event_name("orderCreated")).is_ok());
        assert!(validate_subscribe_event(&subscribe("")).is_err());
        assert!(validate_subscribe_event(&subscribe("orders").with_event_name("9lives")).is_err());
        assert!(validate_subscribe_event(&subscribe("orders").with_group_id("billing.v2")).is_ok());
        assert!(validate_subscribe_event(&subscribe("orders").with_group_id("billing v2")).is_err());
    }
}
