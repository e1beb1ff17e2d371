//! Event stream client: retrying fan-out publish and managed subscriptions
//!
//! `publish` validates and encodes synchronously, then hands each target
//! topic to its own detached task that writes with exponential backoff.
//! `register` records the subscription and starts one consume loop that runs
//! until the request's context is cancelled or the broker read fails.

use crate::codec::{construct_event, construct_group_id, construct_topic, decode_event};
use crate::config::{ClientConfig, ReaderConfig, RetryPolicy, WriterConfig};
use crate::error::{EventError, Result};
use crate::provider::{Broker, BrokerReader};
use crate::registry::{Registration, SubscriberRegistry, SubscriptionId, SubscriptionKey};
use crate::retry::{retry_notify, Exhausted};
use crate::types::{ErrorCallback, Event, PublishRequest, Record, SubscribeRequest};
use crate::validation::{validate_publish_event, validate_subscribe_event};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::level_filters::LevelFilter;
use tracing::{dispatcher, Dispatch};

/// Client for publishing to and subscribing from a log broker
///
/// Logs go to the client's own dispatch, built from `ClientConfig::log_mode`
/// unless one is injected with [`EventStreamClient::with_dispatch`]. The
/// process-wide default subscriber is left alone.
pub struct EventStreamClient {
    /// Topic prefix applied to every logical topic
    prefix: String,

    strict_validation: bool,

    retry: RetryPolicy,

    /// Writer settings copied into every publish task
    writer_config: WriterConfig,

    config: ClientConfig,

    broker: Arc<dyn Broker>,

    registry: Arc<SubscriberRegistry>,

    dispatch: Dispatch,
}

impl EventStreamClient {
    /// Create a client over `broker`; topics are qualified as `<prefix>.<topic>`
    pub fn new(prefix: impl Into<String>, broker: impl Broker + 'static, config: ClientConfig) -> Self {
        let dispatch = build_dispatch(config.log_level());
        let client = Self {
            prefix: prefix.into(),
            strict_validation: config.strict_validation,
            retry: config.retry.clone(),
            writer_config: config.writer_config(),
            config,
            broker: Arc::new(broker),
            registry: Arc::new(SubscriberRegistry::new()),
            dispatch,
        };

        dispatcher::with_default(&client.dispatch, || {
            tracing::info!(
                prefix = %client.prefix,
                broker = client.broker.name(),
                "Created event stream client"
            );
        });

        client
    }

    /// Route this client's logs to `dispatch`
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the broker name
    pub fn broker_name(&self) -> &str {
        self.broker.name()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Publish an event to every topic of the request
    ///
    /// Returns once the event is validated, encoded and handed to one
    /// delivery task per topic. Success means accepted for delivery; later
    /// write failures reach only the logs and the request's error callback.
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, request: PublishRequest) -> Result<Event> {
        dispatcher::with_default(&self.dispatch, || {
            let runtime = Handle::try_current().map_err(|e| {
                tracing::error!(error = %e, "Publish called outside a Tokio runtime");
                EventError::Task(e.to_string())
            })?;

            let (record, event) = self.prepare(&request)?;

            for task in self.delivery_tasks(&request, &record, &event) {
                runtime.spawn(task.run_detached().with_subscriber(self.dispatch.clone()));
            }

            Ok(event)
        })
    }

    /// Publish and wait for every topic's delivery to finish
    ///
    /// Topics are still written concurrently with the same retry policy. The
    /// first delivery failure is returned; the error callback, if any, fires
    /// for each failed topic as with [`EventStreamClient::publish`].
    pub async fn publish_sync(&self, request: PublishRequest) -> Result<Event> {
        let (record, event) =
            dispatcher::with_default(&self.dispatch, || self.prepare(&request))?;

        let deliveries = self
            .delivery_tasks(&request, &record, &event)
            .into_iter()
            .map(DeliveryTask::run);

        let results = futures::future::join_all(deliveries)
            .with_subscriber(self.dispatch.clone())
            .await;

        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(event)
    }

    /// Register a subscription and start its consume loop
    ///
    /// Fails with `AlreadyRegistered` when a subscription for the same topic
    /// and event name exists and this request names no group. The reader is
    /// open by the time this returns, so records written afterwards are seen.
    pub async fn register(&self, request: SubscribeRequest) -> Result<SubscriptionHandle> {
        let runtime = Handle::try_current().map_err(|e| EventError::Task(e.to_string()))?;

        let (id, reader_config) =
            dispatcher::with_default(&self.dispatch, || self.admit(&request))?;

        let reader = match self
            .broker
            .reader(reader_config.clone())
            .with_subscriber(self.dispatch.clone())
            .await
        {
            Ok(reader) => reader,
            Err(e) => {
                dispatcher::with_default(&self.dispatch, || {
                    tracing::error!(
                        topic = %reader_config.topic,
                        group = %reader_config.group_id,
                        error = %e,
                        "Unable to open reader"
                    );
                });
                self.registry.unregister(id)?;
                return Err(e);
            }
        };

        let token = request.context.clone();
        let consumer = ConsumeLoop {
            id,
            request,
            topic: reader_config.topic,
            group_id: reader_config.group_id,
            registry: self.registry.clone(),
        };

        let join = runtime.spawn(consumer.run(reader).with_subscriber(self.dispatch.clone()));

        Ok(SubscriptionHandle { id, token, join })
    }

    /// Validate and construct the event; all failures are synchronous
    fn prepare(&self, request: &PublishRequest) -> Result<(Record, Event)> {
        if let Err(e) = validate_publish_event(request, self.strict_validation) {
            tracing::error!(event_name = %request.event_name, error = %e, "Invalid publish request");
            return Err(e);
        }

        construct_event(request).map_err(|e| {
            tracing::error!(
                event_name = %request.event_name,
                error = %e,
                "Unable to construct event"
            );
            e
        })
    }

    fn delivery_tasks(
        &self,
        request: &PublishRequest,
        record: &Record,
        event: &Event,
    ) -> Vec<DeliveryTask> {
        request
            .topics
            .iter()
            .map(|topic| {
                let topic = construct_topic(&self.prefix, topic);
                let mut writer_config = self.writer_config.clone();
                writer_config.topic = topic.clone();

                DeliveryTask {
                    broker: self.broker.clone(),
                    writer_config,
                    retry: self.retry.clone(),
                    topic,
                    record: record.clone(),
                    event: event.clone(),
                    context: request.context.clone(),
                    error_callback: request.error_callback.clone(),
                }
            })
            .collect()
    }

    /// Validate and insert into the registry
    fn admit(&self, request: &SubscribeRequest) -> Result<(SubscriptionId, ReaderConfig)> {
        tracing::debug!(
            topic = %request.topic,
            event_name = %request.event_name,
            "Registering subscriber"
        );

        if let Err(e) = validate_subscribe_event(request) {
            tracing::error!(topic = %request.topic, error = %e, "Invalid subscribe request");
            return Err(e);
        }

        let topic = construct_topic(&self.prefix, &request.topic);
        let group_id = construct_group_id(&request.group_id);

        let registration = self.registry.register(SubscriptionKey {
            topic: request.topic.clone(),
            event_name: request.event_name.clone(),
            group_id: request.group_id.clone(),
        });

        match registration {
            Ok(Registration::Accepted(id)) => Ok((id, self.config.reader_config(topic, group_id))),
            Ok(Registration::AlreadyRegistered) => {
                tracing::warn!(
                    topic = %request.topic,
                    event_name = %request.event_name,
                    "Topic and event already registered"
                );
                Err(EventError::AlreadyRegistered {
                    topic: request.topic.clone(),
                    event_name: request.event_name.clone(),
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to register subscriber");
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }
}

fn build_dispatch(level: LevelFilter) -> Dispatch {
    if level == LevelFilter::OFF {
        return Dispatch::none();
    }
    Dispatch::new(tracing_subscriber::fmt().with_max_level(level).finish())
}

/// One event's delivery to one fully-qualified topic
struct DeliveryTask {
    broker: Arc<dyn Broker>,
    writer_config: WriterConfig,
    retry: RetryPolicy,
    topic: String,
    record: Record,
    event: Event,
    context: CancellationToken,
    error_callback: Option<ErrorCallback>,
}

impl DeliveryTask {
    /// Run with nobody waiting on the outcome
    async fn run_detached(self) {
        // Failures are already logged and handed to the error callback
        let _ = self.run().await;
    }

    async fn run(self) -> Result<()> {
        let task = &self;
        let outcome = retry_notify(
            &self.retry,
            || task.write_once(),
            |e, delay| {
                tracing::debug!(
                    topic = %task.topic,
                    error = %e,
                    retry_in = ?delay,
                    "Retrying publish event"
                );
            },
        )
        .await;

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    event_name = %self.event.event_name,
                    topic = %self.topic,
                    "Successfully published event"
                );
                Ok(())
            }
            Err(Exhausted { error, attempts }) => {
                tracing::error!(
                    event_name = %self.event.event_name,
                    topic = %self.topic,
                    attempts,
                    error = %error,
                    "Unable to publish event"
                );

                let reason = error.to_string();
                if let Some(callback) = &self.error_callback {
                    callback(self.event.clone(), self.failure(attempts, &reason));
                }
                Err(self.failure(attempts, &reason))
            }
        }
    }

    /// Open a writer, write once, release the writer
    async fn write_once(&self) -> Result<()> {
        tracing::debug!(
            event_name = %self.event.event_name,
            topic = %self.topic,
            "Publish event"
        );

        let mut writer = self.broker.writer(self.writer_config.clone()).await?;
        let result = writer.write(&self.context, self.record.clone()).await;

        if let Err(e) = writer.close().await {
            tracing::warn!(topic = %self.topic, error = %e, "Failed to close writer");
        }

        result.map_err(|e| {
            tracing::error!(topic = %self.topic, error = %e, "Unable to publish event to broker");
            e
        })
    }

    fn failure(&self, attempts: u32, reason: &str) -> EventError {
        EventError::DeliveryFailed {
            topic: self.topic.clone(),
            attempts,
            reason: reason.to_string(),
        }
    }
}

/// How a consume loop ended
#[derive(Debug)]
pub enum ConsumeExit {
    /// The subscription's context was cancelled; the callback saw `Cancelled`
    Cancelled,
    /// A broker read failed; the callback was not invoked
    Failed(EventError),
}

/// Handle to a running subscription
///
/// Dropping the handle does not stop the subscription; cancel its context.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    token: CancellationToken,
    join: JoinHandle<ConsumeExit>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Cancel the subscription's context
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the consume loop has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the consume loop to exit
    pub async fn join(self) -> Result<ConsumeExit> {
        self.join
            .await
            .map_err(|e| EventError::Task(format!("consume loop {} failed: {}", self.id, e)))
    }
}

/// Per-subscription consume loop; owns its reader for its whole life
struct ConsumeLoop {
    id: SubscriptionId,
    request: SubscribeRequest,
    topic: String,
    group_id: String,
    registry: Arc<SubscriberRegistry>,
}

impl ConsumeLoop {
    async fn run(self, mut reader: Box<dyn BrokerReader>) -> ConsumeExit {
        // A panicking callback must not leak the reader or the registry entry
        let outcome = AssertUnwindSafe(self.consume(reader.as_mut()))
            .catch_unwind()
            .await;

        if let Err(e) = reader.close().await {
            tracing::warn!(topic = %self.topic, error = %e, "Failed to close reader");
        }
        if let Err(e) = self.registry.unregister(self.id) {
            tracing::error!(subscription = %self.id, error = %e, "Unable to unregister subscriber");
        }

        match outcome {
            Ok(exit) => exit,
            Err(panic) => {
                tracing::error!(
                    topic = %self.topic,
                    subscription = %self.id,
                    "Subscriber callback panicked"
                );
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn consume(&self, reader: &mut dyn BrokerReader) -> ConsumeExit {
        let ctx = &self.request.context;

        loop {
            if ctx.is_cancelled() {
                return self.cancelled().await;
            }

            match reader.read(ctx).await {
                Ok(record) => self.process(record).await,
                Err(_) if ctx.is_cancelled() => return self.cancelled().await,
                Err(e) => {
                    tracing::error!(
                        topic = %self.topic,
                        group = %self.group_id,
                        error = %e,
                        "Unable to subscribe topic from broker"
                    );
                    return ConsumeExit::Failed(e);
                }
            }
        }
    }

    async fn cancelled(&self) -> ConsumeExit {
        tracing::info!(
            topic = %self.topic,
            event_name = %self.request.event_name,
            subscription = %self.id,
            "Subscription cancelled"
        );
        (self.request.callback)(Err(EventError::Cancelled)).await;
        ConsumeExit::Cancelled
    }

    async fn process(&self, record: Record) {
        tracing::debug!(topic = %record.topic, group = %self.group_id, "Process record");

        let event = match decode_event(&record.value) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(topic = %record.topic, error = %e, "Unable to decode record");
                return;
            }
        };

        let filter = &self.request.event_name;
        if !filter.is_empty() && *filter != event.event_name {
            return;
        }

        tracing::debug!(
            topic = %record.topic,
            event_name = %event.event_name,
            group = %self.group_id,
            "Run callback"
        );
        (self.request.callback)(Ok(event)).await;
    }
}
