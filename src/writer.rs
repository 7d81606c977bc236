// Copyright 2025 Cowboy AI, LLC.

//! Graph writer gateway
//!
//! Owns the Bolt connection and exposes one operation: execute a mutation
//! and return once the server acknowledged it. This is a write-only
//! workload; result streams are drained and discarded.
//!
//! Failures are normalised into the loop's taxonomy: transport failures
//! trigger an in-place reconnect (exponential backoff, bounded budget) and
//! surface as retriable; everything else the server rejects is permanent
//! for this payload and surfaces as such.

use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltMap, BoltString, BoltType, Graph, Query};
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::error::{Result, SyncError};
use crate::planner::{Mutation, ParamValue, Scalar};

/// Executes planned mutations against a graph store
///
/// The gateway implementation talks Bolt; tests substitute a recorder.
#[async_trait]
pub trait MutationExecutor: Send {
    /// Execute one mutation, returning after the server acknowledged it
    async fn execute(&mut self, mutation: &Mutation) -> Result<()>;
}

/// Bolt-protocol gateway with reconnect-on-loss
pub struct GraphGateway {
    graph: Graph,
    config: GraphConfig,
}

impl GraphGateway {
    /// Connect and verify the endpoint actually answers
    ///
    /// An unreachable graph at startup is fatal; there is nothing to retry
    /// into.
    pub async fn connect(config: GraphConfig) -> Result<Self> {
        info!(uri = %config.uri(), "connecting to graph");
        let graph = Self::open(&config).await.map_err(|e| {
            SyncError::Fatal(format!("cannot connect to graph at {}: {e}", config.uri()))
        })?;
        Ok(Self { graph, config })
    }

    /// Create uniqueness constraints for the registry's node labels
    pub async fn initialize_constraints(&self, statements: &[String]) -> Result<()> {
        for statement in statements {
            self.graph
                .run(Query::new(statement.clone()))
                .await
                .map_err(|e| {
                    SyncError::Fatal(format!("constraint initialization failed: {e}"))
                })?;
        }
        info!(count = statements.len(), "graph constraints initialized");
        Ok(())
    }

    async fn open(config: &GraphConfig) -> std::result::Result<Graph, neo4rs::Error> {
        let graph = Graph::new(&config.uri(), &config.user, &config.password).await?;
        // The driver pools connections lazily; ping so a dead endpoint
        // fails here instead of on the first event.
        graph.run(Query::new("RETURN 1".to_string())).await?;
        Ok(graph)
    }

    async fn run_once(&self, mutation: &Mutation) -> std::result::Result<(), neo4rs::Error> {
        let mut query = Query::new(mutation.template.to_string());
        for (name, value) in &mutation.params {
            query = query.param(name, to_bolt(value));
        }
        self.graph.run(query).await
    }

    /// Re-establish the connection within the configured budget
    async fn reconnect(&mut self) -> Result<()> {
        let policy = self.config.reconnect;
        let mut backoff = Duration::from_millis(500);
        for attempt in 1..=policy.max_attempts {
            tokio::time::sleep(backoff).await;
            match Self::open(&self.config).await {
                Ok(graph) => {
                    self.graph = graph;
                    info!(attempt, "graph connection re-established");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "graph reconnect attempt failed");
                }
            }
            backoff = (backoff * 2).min(policy.max_backoff);
        }
        Err(SyncError::Fatal(format!(
            "graph reconnection budget exhausted after {} attempts",
            policy.max_attempts
        )))
    }
}

#[async_trait]
impl MutationExecutor for GraphGateway {
    async fn execute(&mut self, mutation: &Mutation) -> Result<()> {
        match self.run_once(mutation).await {
            Ok(()) => {
                debug!(kind = ?mutation.kind, "mutation acknowledged");
                Ok(())
            }
            Err(e) if connection_lost(&e) => {
                warn!(error = %e, "graph connection lost");
                self.reconnect().await?;
                Err(SyncError::Retriable(format!("connection lost: {e}")))
            }
            Err(e) => Err(SyncError::Rejected(e.to_string())),
        }
    }
}

fn connection_lost(err: &neo4rs::Error) -> bool {
    if matches!(err, neo4rs::Error::IOError { .. }) {
        return true;
    }
    // The driver folds some transport failures into opaque variants; the
    // message is the only remaining signal.
    let text = err.to_string().to_ascii_lowercase();
    text.contains("connection") || text.contains("broken pipe") || text.contains("timed out")
}

fn scalar_to_bolt(scalar: &Scalar) -> BoltType {
    match scalar {
        Scalar::String(v) => BoltType::String(BoltString::from(v.as_str())),
        Scalar::Integer(v) => BoltType::Integer(BoltInteger::new(*v)),
        Scalar::Float(v) => BoltType::Float(BoltFloat::new(*v)),
        Scalar::Boolean(v) => BoltType::Boolean(BoltBoolean::new(*v)),
    }
}

fn to_bolt(value: &ParamValue) -> BoltType {
    match value {
        ParamValue::Scalar(scalar) => scalar_to_bolt(scalar),
        ParamValue::Props(pairs) => {
            let mut map = BoltMap::new();
            for (key, scalar) in pairs {
                map.put(BoltString::from(key.as_str()), scalar_to_bolt(scalar));
            }
            BoltType::Map(map)
        }
    }
}

/// Executor that records mutations instead of writing them
///
/// Used by tests and dry runs to assert on exactly what would have been
/// sent to the graph.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Vec<Mutation>,
}

impl RecordingExecutor {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations executed so far, in order
    pub fn executed(&self) -> &[Mutation] {
        &self.executed
    }

    /// Take the recorded mutations, leaving the recorder empty
    pub fn take(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.executed)
    }
}

#[async_trait]
impl MutationExecutor for RecordingExecutor {
    async fn execute(&mut self, mutation: &Mutation) -> Result<()> {
        self.executed.push(mutation.clone());
        Ok(())
    }
}
