//! # a3s-eventstream
//!
//! Typed event envelopes, retrying multi-topic publish, and managed
//! subscriptions on top of partitioned log brokers.
//!
//! ## Overview
//!
//! `a3s-eventstream` validates and encodes events, fans one event out to
//! several topics with per-topic exponential-backoff retry, and runs one
//! consume loop per subscription that decodes records and hands matching
//! events to a callback. Brokers plug in behind the `Broker` trait.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_eventstream::{ClientConfig, Event, EventStreamClient, PublishRequest, SubscribeRequest};
//! use a3s_eventstream::provider::memory::MemoryBroker;
//!
//! # async fn example() -> a3s_eventstream::Result<()> {
//! let client = EventStreamClient::new("shop", MemoryBroker::default(), ClientConfig::default());
//!
//! let subscription = client
//!     .register(
//!         SubscribeRequest::new("orders", |delivery: a3s_eventstream::Result<Event>| async move {
//!             if let Ok(event) = delivery {
//!                 println!("received {}", event.id);
//!             }
//!         })
//!         .with_event_name("orderCreated"),
//!     )
//!     .await?;
//!
//! let event = client.publish(
//!     PublishRequest::new("orderCreated")
//!         .with_topic("orders")
//!         .with_payload(serde_json::json!({"orderId": 42})),
//! )?;
//! println!("accepted {}", event.id);
//!
//! subscription.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! ## Brokers
//!
//! - **memory** — In-process broker for testing and single-process use
//! - **nats** — NATS JetStream, topics as subjects, groups as durable consumers
//!
//! ## Architecture
//!
//! - **Broker** trait — short-lived writers, long-lived group readers
//! - **EventStreamClient** — publish fan-out with retry, subscription lifecycle
//! - **SubscriberRegistry** — duplicate detection for subscriptions
//! - **Event** — wire envelope, JSON encoded

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod types;
pub mod validation;

// Re-export core types
pub use client::{ConsumeExit, EventStreamClient, SubscriptionHandle};
pub use codec::{construct_event, construct_group_id, construct_topic, decode_event, encode_event};
pub use config::{ClientConfig, LogMode, ReaderConfig, RetryPolicy, StartOffset, WriterConfig};
pub use error::{EventError, Result};
pub use provider::{Broker, BrokerReader, BrokerWriter};
pub use registry::{Registration, SubscriberRegistry, SubscriptionId, SubscriptionKey};
pub use types::{ErrorCallback, Event, PublishRequest, Record, SubscribeCallback, SubscribeRequest};
pub use validation::{validate_publish_event, validate_subscribe_event};

// Re-export brokers for convenience
pub use provider::memory::{MemoryBroker, MemoryConfig};
pub use provider::nats::{NatsBroker, NatsClient, NatsConfig, StorageType};
