// Copyright 2025 Cowboy AI, LLC.

//! Projector and consumption loop
//!
//! [`Projector`] carries one message through decode → rule lookup → plan →
//! execute and reports a [`Disposition`]. [`SyncService`] drives the bus:
//! poll, project, then acknowledge / redeliver / terminate according to the
//! disposition. The loop handles exactly one event at a time; per-partition
//! ordering is preserved end to end, and shutdown is only observed between
//! events.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::envelope::{decode, ChangeEvent, Decoded, SkipReason};
use crate::error::{ErrorClass, Result, SyncError};
use crate::planner::MutationPlanner;
use crate::schema::SchemaRegistry;
use crate::shutdown::ShutdownSignal;
use crate::writer::MutationExecutor;

/// How the loop should dispose of the message that produced this outcome
#[derive(Debug)]
pub enum Disposition {
    /// All mutations landed; acknowledge
    Applied(usize),
    /// Nothing to write; acknowledge
    Skipped(&'static str),
    /// Redelivery cannot help; drop the message and acknowledge
    Poisoned(SyncError),
    /// Transient failure; leave unacknowledged for redelivery
    Retry(SyncError),
    /// The loop must terminate
    Fatal(SyncError),
}

/// Projects individual CDC messages into graph mutations
pub struct Projector<W> {
    registry: SchemaRegistry,
    planner: MutationPlanner,
    writer: W,
    unknown_tables: HashSet<String>,
}

impl<W: MutationExecutor> Projector<W> {
    /// Create a projector writing through the given executor
    pub fn new(registry: SchemaRegistry, writer: W) -> Self {
        Self {
            registry,
            planner: MutationPlanner::new(),
            writer,
            unknown_tables: HashSet::new(),
        }
    }

    /// The executor this projector writes through
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Project one raw message and report its disposition
    pub async fn apply(&mut self, topic: &str, payload: &[u8]) -> Disposition {
        let decoded = match decode(topic, payload) {
            Ok(decoded) => decoded,
            Err(e) => return Disposition::Poisoned(e),
        };

        let event = match decoded {
            Decoded::Tombstone => {
                debug!(topic, "tombstone, nothing to project");
                return Disposition::Skipped("tombstone");
            }
            Decoded::Skip(SkipReason::UnknownOp(op)) => {
                warn!(topic, op = %op, "unknown operation code, dropping");
                return Disposition::Skipped("unknown op");
            }
            Decoded::Skip(SkipReason::Truncate) => {
                debug!(topic, "truncate is not projected");
                return Disposition::Skipped("truncate");
            }
            Decoded::Skip(SkipReason::NoPayload) => {
                debug!(topic, "message without payload");
                return Disposition::Skipped("no payload");
            }
            Decoded::Skip(SkipReason::NullRow) => {
                debug!(topic, "selected row side is null");
                return Disposition::Skipped("null row");
            }
            Decoded::Event(event) => event,
        };

        let Some(rule) = self.registry.lookup(&event.table) else {
            if self.unknown_tables.insert(event.table.clone()) {
                warn!(
                    table = %event.table,
                    "table not in schema registry, its events will be dropped"
                );
            }
            return Disposition::Skipped("unknown table");
        };

        let mutations = match self.planner.plan(&event, rule) {
            Ok(mutations) => mutations,
            Err(e) => return Disposition::Poisoned(e),
        };

        for mutation in &mutations {
            if let Err(e) = self.writer.execute(mutation).await {
                return match e.class() {
                    ErrorClass::Retry => Disposition::Retry(e),
                    ErrorClass::Drop => Disposition::Poisoned(e),
                    ErrorClass::Fatal => Disposition::Fatal(e),
                };
            }
        }

        log_success(&event, mutations.len());
        Disposition::Applied(mutations.len())
    }
}

fn log_success(event: &ChangeEvent, mutations: usize) {
    info!(
        op = %event.op.code(),
        table = %event.table,
        mutations,
        "SUCCESS"
    );
}

/// The consumption loop coupling bus, projector, and shutdown flag
pub struct SyncService<W> {
    bus: EventBus,
    projector: Projector<W>,
    shutdown: ShutdownSignal,
    poll_timeout: Duration,
    applied: u64,
    dropped: u64,
    retried: u64,
}

impl<W: MutationExecutor> SyncService<W> {
    /// Assemble a service; polling uses a one-second timeout so shutdown
    /// is observed promptly
    pub fn new(bus: EventBus, projector: Projector<W>, shutdown: ShutdownSignal) -> Self {
        Self {
            bus,
            projector,
            shutdown,
            poll_timeout: Duration::from_secs(1),
            applied: 0,
            dropped: 0,
            retried: 0,
        }
    }

    /// Run until shutdown or a fatal error; resources are released on
    /// every exit path, bus first so acknowledged progress is flushed
    pub async fn run(mut self) -> Result<()> {
        let outcome = self.consume().await;
        self.bus.close().await;
        match &outcome {
            Ok(()) => info!(
                applied = self.applied,
                dropped = self.dropped,
                "shutdown complete"
            ),
            Err(e) => error!(error = %e, "terminating after fatal error"),
        }
        outcome
    }

    async fn consume(&mut self) -> Result<()> {
        info!("starting consumption loop");

        while !self.shutdown.is_triggered() {
            let message = match self.bus.poll(self.poll_timeout).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) if e.class() == ErrorClass::Fatal => return Err(e),
                Err(e) => {
                    // Transport hiccup; the bus client retries internally.
                    error!(error = %e, "bus poll failed");
                    continue;
                }
            };

            match self.projector.apply(message.topic(), message.payload()).await {
                Disposition::Applied(_) => {
                    self.applied += 1;
                    if let Err(e) = message.ack().await {
                        error!(error = %e, "failed to acknowledge message");
                    }
                }
                Disposition::Skipped(reason) => {
                    self.dropped += 1;
                    debug!(topic = message.topic(), reason, "acknowledging no-op");
                    if let Err(e) = message.ack().await {
                        error!(error = %e, "failed to acknowledge message");
                    }
                }
                Disposition::Poisoned(err) => {
                    self.dropped += 1;
                    warn!(topic = message.topic(), error = %err, "dropping poison message");
                    if let Err(e) = message.reject().await {
                        error!(error = %e, "failed to terminate message");
                    }
                }
                Disposition::Retry(err) => {
                    self.retried += 1;
                    let delay = redelivery_backoff(message.deliveries());
                    warn!(
                        topic = message.topic(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling redelivery"
                    );
                    if let Err(e) = message.redeliver_after(delay).await {
                        error!(error = %e, "failed to schedule redelivery");
                    }
                }
                Disposition::Fatal(err) => return Err(err),
            }

            let total = self.applied + self.dropped + self.retried;
            if total > 0 && total % 100 == 0 {
                info!(
                    applied = self.applied,
                    dropped = self.dropped,
                    retried = self.retried,
                    "progress"
                );
            }
        }

        info!("shutdown signal observed, leaving consumption loop");
        Ok(())
    }
}

/// Redelivery delay doubling with each delivery, capped at 30 s
fn redelivery_backoff(deliveries: i64) -> Duration {
    let exponent = (deliveries.clamp(1, 9) - 1) as u32;
    let delay = Duration::from_millis(100) * 2u32.pow(exponent);
    delay.min(Duration::from_secs(30))
}
