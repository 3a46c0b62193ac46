//! External queue ingress.
//!
//! A JetStream station feeds the router: each message body is one JSON
//! event. Malformed messages are acked and dropped so a poison message
//! never wedges the station; well-formed messages are acked only after
//! the router accepts them, leaving routing failures to broker
//! redelivery.

use async_nats::jetstream::{self, consumer::pull, stream};
use futures::StreamExt;

use skiff_core::config::QueueConfig;
use skiff_core::model::event::Event;
use skiff_core::{Error, Result};

use crate::state::AppState;

/// What the consumer should do with a delivery
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Routed successfully; acknowledge
    Ack,
    /// Malformed body; acknowledge anyway to avoid redelivery
    AckAndDrop,
    /// Router error; leave unacked so the broker redelivers
    Redeliver,
}

/// Decode and route one queue delivery.
///
/// Split out from the consumer loop so the ingest path is testable
/// without a broker.
pub async fn dispatch_payload(state: &AppState, payload: &[u8]) -> Disposition {
    let event: Event = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(error = %err, "Failed to decode queued event, dropping");
            return Disposition::AckAndDrop;
        }
    };

    tracing::info!(event_id = %event.id, event_type = event.kind.name(),
        target_agent = %event.target_agent, "Received event");
    state.record_ingest(&event, "event_received").await;

    let event_id = event.id.clone();
    match state.router.route_event(event).await {
        Ok(()) => Disposition::Ack,
        Err(err) => {
            tracing::error!(event_id = %event_id, error = %err, "Error handling event");
            Disposition::Redeliver
        }
    }
}

/// Connection to the external event queue
pub struct NatsQueue {
    jetstream: jetstream::Context,
    stream: stream::Stream,
    config: QueueConfig,
}

impl NatsQueue {
    /// Connect to the broker and get or create the station.
    ///
    /// Failure here is fatal at control-plane startup when the queue is
    /// enabled.
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| Error::queue(format!("connect: {e}")))?;
        let jetstream = jetstream::new(client);

        let stream = jetstream
            .get_or_create_stream(stream::Config {
                name: config.station.clone(),
                subjects: vec![config.station.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::queue(format!("create station: {e}")))?;

        Ok(Self {
            jetstream,
            stream,
            config: config.clone(),
        })
    }

    /// Publish an event to the station.
    ///
    /// The message id is the event id so the broker can dedup resubmits.
    pub async fn publish_event(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", event.id.as_str());

        self.jetstream
            .publish_with_headers(self.config.station.clone(), headers, payload.into())
            .await
            .map_err(|e| Error::queue(format!("publish: {e}")))?
            .await
            .map_err(|e| Error::queue(format!("publish ack: {e}")))?;

        Ok(())
    }

    /// Consume the station until the message stream ends.
    pub async fn consume(&self, state: AppState) -> Result<()> {
        let consumer = self
            .stream
            .get_or_create_consumer(
                &self.config.consumer_name,
                pull::Config {
                    durable_name: Some(self.config.consumer_name.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::queue(format!("create consumer: {e}")))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| Error::queue(format!("subscribe: {e}")))?;

        tracing::info!(station = %self.config.station, "Event consumer started");

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "Error consuming message");
                    continue;
                }
            };

            match dispatch_payload(&state, &message.payload).await {
                Disposition::Ack | Disposition::AckAndDrop => {
                    if let Err(err) = message.ack().await {
                        tracing::warn!(error = %err, "Failed to ack message");
                    }
                }
                Disposition::Redeliver => {}
            }
        }

        Ok(())
    }
}
