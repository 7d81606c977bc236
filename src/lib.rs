// Copyright 2025 Cowboy AI, LLC.

//! CDC-to-Graph Synchronizer
//!
//! Consumes row-level change events (Debezium envelopes, JSON-encoded)
//! from a message bus and projects them into a property graph. Each
//! upstream table maps to a node label, a property merge on an existing
//! node, or a relationship, according to a declarative schema registry.
//! The projection is continuous, resumable, and idempotent under
//! at-least-once delivery.
//!
//! ## Graph Model
//!
//! Entity tables become nodes keyed by `id` (`users` → `User`,
//! `business_connections` → `BusinessConnection`, …). Join tables become
//! relationships, for example:
//!
//! - `(User)-[:HAS_SKILL]->(Skill)`
//! - `(User)-[:VOTED_ON {type}]->(Idea)`
//! - `(Business)-[:INITIATED_CONNECTION]->(BusinessConnection)`
//! - `(User)-[:HAS_SUBSCRIPTION {date_from, …}]->(Subscription)`
//!
//! Foreign keys on entity rows produce edges alongside the node
//! (`(User)-[:OPERATES]->(Business)` from `operator_user_id`), and
//! one-to-one tables fold onto their owner (`user_logins.login_email`
//! becomes `User.loginEmail`).
//!
//! ## Resilience
//!
//! Edge upserts `MATCH` both endpoints before `MERGE`, so an edge whose
//! endpoints have not arrived yet writes nothing and is recreated by the
//! next event touching that row. All mutations are idempotent, which makes
//! redelivery safe.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cdc_graph_sync::{
//!     EventBus, GraphGateway, Projector, SchemaRegistry, ShutdownSignal, SyncConfig,
//!     SyncService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::from_env()?;
//!     let registry = SchemaRegistry::standard();
//!
//!     let gateway = GraphGateway::connect(config.graph.clone()).await?;
//!     gateway
//!         .initialize_constraints(&registry.constraint_statements())
//!         .await?;
//!
//!     let bus = EventBus::connect(&config.bus).await?;
//!     let service = SyncService::new(
//!         bus,
//!         Projector::new(registry, gateway),
//!         ShutdownSignal::install(),
//!     );
//!     service.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod labels;
pub mod planner;
pub mod schema;
pub mod service;
pub mod shutdown;
pub mod writer;

pub use bus::{BusMessage, EventBus};
pub use config::{BusConfig, GraphConfig, OffsetReset, ReconnectPolicy, SyncConfig};
pub use envelope::{decode, ChangeEvent, ChangeOp, Decoded, SkipReason};
pub use error::{ErrorClass, Result, SyncError};
pub use labels::{table_to_label, LabelCache};
pub use planner::{Mutation, MutationKind, MutationPlanner, ParamValue, Scalar};
pub use schema::{Direction, EdgeRule, OwnedEdge, SchemaRegistry, TableRule};
pub use service::{Disposition, Projector, SyncService};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use writer::{GraphGateway, MutationExecutor, RecordingExecutor};
