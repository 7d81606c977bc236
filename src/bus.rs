// Copyright 2025 Cowboy AI, LLC.

//! Message bus plumbing
//!
//! Wraps a JetStream durable pull consumer behind the small contract the
//! consumption loop needs: poll with a timeout, then acknowledge, schedule
//! redelivery, or terminate each message. Offset durability lives entirely
//! in the bus; this process persists nothing.

use std::pin::Pin;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::PullConsumer, AckKind};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{BusConfig, OffsetReset};
use crate::error::{Result, SyncError};

type MessageStream = Pin<Box<jetstream::consumer::pull::Stream>>;

/// One message pulled from a CDC topic
pub struct BusMessage {
    inner: jetstream::Message,
}

impl BusMessage {
    /// Topic (subject) the message arrived on
    pub fn topic(&self) -> &str {
        self.inner.subject.as_str()
    }

    /// Raw payload bytes; zero-length for tombstones
    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    /// How many times the bus has delivered this message
    pub fn deliveries(&self) -> i64 {
        self.inner.info().map(|info| info.delivered).unwrap_or(1)
    }

    /// Acknowledge: the event landed or was deliberately dropped
    pub async fn ack(&self) -> Result<()> {
        self.inner
            .ack()
            .await
            .map_err(|e| SyncError::Retriable(format!("ack failed: {e}")))
    }

    /// Negative-acknowledge with a delay; the bus will redeliver
    pub async fn redeliver_after(&self, delay: Duration) -> Result<()> {
        self.inner
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| SyncError::Retriable(format!("nak failed: {e}")))
    }

    /// Terminate: redelivery cannot help this message
    pub async fn reject(&self) -> Result<()> {
        self.inner
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| SyncError::Retriable(format!("term failed: {e}")))
    }
}

/// Durable subscription over the configured CDC topics
pub struct EventBus {
    client: async_nats::Client,
    messages: MessageStream,
}

impl EventBus {
    /// Connect, ensure stream and durable consumer exist, start pulling
    pub async fn connect(config: &BusConfig) -> Result<Self> {
        info!(servers = ?config.servers, "connecting to message bus");
        let client = async_nats::ConnectOptions::new()
            .name("cdc-graph-sync")
            .connect(config.servers.join(","))
            .await
            .map_err(|e| SyncError::Fatal(format!("cannot connect to message bus: {e}")))?;

        let context = jetstream::new(client.clone());

        let stream = match context.get_stream(&config.stream).await {
            Ok(stream) => stream,
            Err(_) => {
                info!(stream = %config.stream, "stream not found, creating");
                context
                    .create_stream(jetstream::stream::Config {
                        name: config.stream.clone(),
                        subjects: config.topics.clone(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| SyncError::Fatal(format!("cannot create stream: {e}")))?;
                context
                    .get_stream(&config.stream)
                    .await
                    .map_err(|e| SyncError::Fatal(format!("cannot open stream: {e}")))?
            }
        };

        let deliver_policy = match config.offset {
            OffsetReset::Earliest => jetstream::consumer::DeliverPolicy::All,
            OffsetReset::Latest => jetstream::consumer::DeliverPolicy::New,
        };

        let consumer: PullConsumer = match stream.get_consumer(&config.group).await {
            Ok(consumer) => consumer,
            Err(_) => {
                info!(consumer = %config.group, "consumer not found, creating");
                stream
                    .create_consumer(jetstream::consumer::pull::Config {
                        durable_name: Some(config.group.clone()),
                        ack_policy: jetstream::consumer::AckPolicy::Explicit,
                        deliver_policy,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| SyncError::Fatal(format!("cannot create consumer: {e}")))?;
                stream
                    .get_consumer(&config.group)
                    .await
                    .map_err(|e| SyncError::Fatal(format!("cannot open consumer: {e}")))?
            }
        };

        // One message at a time: the loop is deliberately serial so
        // updates can never overtake the creates they depend on.
        let messages = consumer
            .stream()
            .max_messages_per_batch(1)
            .messages()
            .await
            .map_err(|e| SyncError::Fatal(format!("cannot start consuming: {e}")))?;

        info!(topics = ?config.topics, group = %config.group, "subscribed to CDC topics");

        Ok(Self {
            client,
            messages: Box::pin(messages),
        })
    }

    /// Wait for the next message, up to `timeout`
    ///
    /// `Ok(None)` is the poll timeout; it exists so the loop can observe
    /// the shutdown flag between messages.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>> {
        match tokio::time::timeout(timeout, self.messages.next()).await {
            Err(_) => {
                debug!("poll timeout, no messages waiting");
                Ok(None)
            }
            Ok(None) => Err(SyncError::Fatal("message stream ended".to_string())),
            Ok(Some(Err(e))) => Err(SyncError::Retriable(format!("bus poll failed: {e}"))),
            Ok(Some(Ok(message))) => Ok(Some(BusMessage { inner: message })),
        }
    }

    /// Flush pending acknowledgements and release the connection
    pub async fn close(self) {
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "flush on close failed");
        }
        info!("message bus connection closed");
    }
}
