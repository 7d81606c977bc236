// Copyright 2025 Cowboy AI, LLC.

//! Configuration for the synchronizer
//!
//! All options are read from environment variables with code defaults, so
//! the service can run unconfigured against a local stack. Invalid values
//! are configuration errors and abort startup.

use std::time::Duration;

use crate::error::{Result, SyncError};

/// Message bus (NATS JetStream) configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// JetStream stream that captures the CDC topics
    pub stream: String,
    /// Durable consumer name; drives load balancing and ack bookkeeping
    pub group: String,
    /// Where a fresh consumer starts reading
    pub offset: OffsetReset,
    /// CDC topic names to subscribe to (`<connector>.<db>.<table>`)
    pub topics: Vec<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            stream: "CDC_EVENTS".to_string(),
            group: "graph-sync".to_string(),
            offset: OffsetReset::Earliest,
            topics: Vec::new(),
        }
    }
}

/// Initial offset position for a consumer with no committed progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Read the stream from the beginning
    Earliest,
    /// Read only messages published after the consumer was created
    Latest,
}

impl std::str::FromStr for OffsetReset {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(SyncError::Config(format!(
                "OFFSET_INITIAL must be 'earliest' or 'latest', got '{other}'"
            ))),
        }
    }
}

/// Graph database connection configuration
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Graph server host
    pub host: String,
    /// Bolt port
    pub port: u16,
    /// Username for authentication (empty for no auth)
    pub user: String,
    /// Password for authentication
    pub password: String,
    /// Reconnection budget after a lost connection
    pub reconnect: ReconnectPolicy,
}

impl GraphConfig {
    /// Bolt URI for the configured endpoint
    pub fn uri(&self) -> String {
        format!("bolt://{}:{}", self.host, self.port)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7687,
            user: "".to_string(), // No auth by default
            password: "".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Reconnection budget for the graph writer
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Attempts before the failure becomes fatal
    pub max_attempts: u32,
    /// Backoff cap between attempts
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Complete synchronizer configuration
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Message bus options
    pub bus: BusConfig,
    /// Graph database options
    pub graph: GraphConfig,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to defaults; `CDC_TOPICS` is required
    /// because a synchronizer with nothing to consume is a misconfiguration.
    pub fn from_env() -> Result<Self> {
        let mut bus = BusConfig::default();
        if let Ok(servers) = std::env::var("NATS_URL") {
            bus.servers = servers.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(stream) = std::env::var("NATS_STREAM") {
            bus.stream = stream;
        }
        if let Ok(group) = std::env::var("CONSUMER_GROUP") {
            bus.group = group;
        }
        if let Ok(offset) = std::env::var("OFFSET_INITIAL") {
            bus.offset = offset.parse()?;
        }
        bus.topics = std::env::var("CDC_TOPICS")
            .map(|t| {
                t.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if bus.topics.is_empty() {
            return Err(SyncError::Config(
                "CDC_TOPICS must list at least one topic".to_string(),
            ));
        }

        let mut graph = GraphConfig::default();
        if let Ok(host) = std::env::var("GRAPH_HOST") {
            graph.host = host;
        }
        if let Ok(port) = std::env::var("GRAPH_PORT") {
            graph.port = port
                .parse()
                .map_err(|_| SyncError::Config(format!("GRAPH_PORT is not a port: '{port}'")))?;
        }
        if let Ok(user) = std::env::var("GRAPH_USER") {
            graph.user = user;
        }
        if let Ok(password) = std::env::var("GRAPH_PASSWORD") {
            graph.password = password;
        }
        if let Ok(attempts) = std::env::var("GRAPH_RECONNECT_MAX_ATTEMPTS") {
            graph.reconnect.max_attempts = attempts.parse().map_err(|_| {
                SyncError::Config(format!(
                    "GRAPH_RECONNECT_MAX_ATTEMPTS is not a number: '{attempts}'"
                ))
            })?;
        }
        if let Ok(backoff) = std::env::var("GRAPH_RECONNECT_MAX_BACKOFF_MS") {
            let ms: u64 = backoff.parse().map_err(|_| {
                SyncError::Config(format!(
                    "GRAPH_RECONNECT_MAX_BACKOFF_MS is not a number: '{backoff}'"
                ))
            })?;
            graph.reconnect.max_backoff = Duration::from_millis(ms);
        }

        Ok(Self { bus, graph })
    }
}
