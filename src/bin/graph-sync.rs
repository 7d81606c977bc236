// Copyright (c) 2025 - Cowboy AI, Inc.
//! CDC Graph Synchronizer Service
//!
//! Consumes Debezium change events from JetStream CDC topics and projects
//! them into the property graph.
//!
//! Run with: cargo run --bin graph-sync
//!
//! Prerequisites:
//! 1. NATS server with JetStream enabled (default: localhost:4222)
//! 2. Graph database reachable over Bolt (default: localhost:7687)
//! 3. `CDC_TOPICS` set to the comma-separated topic list

use anyhow::{Context, Result};
use cdc_graph_sync::{
    EventBus, GraphGateway, Projector, SchemaRegistry, ShutdownSignal, SyncConfig, SyncService,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting CDC Graph Synchronizer");

    let config = SyncConfig::from_env().context("Invalid configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Bus servers: {:?}", config.bus.servers);
    info!("  - Stream: {}", config.bus.stream);
    info!("  - Consumer group: {}", config.bus.group);
    info!("  - Topics: {:?}", config.bus.topics);
    info!("  - Graph: {}", config.graph.uri());

    let registry = SchemaRegistry::standard();

    let gateway = GraphGateway::connect(config.graph.clone())
        .await
        .context("Failed to connect to graph")?;
    info!("✅ Connected to graph");

    gateway
        .initialize_constraints(&registry.constraint_statements())
        .await
        .context("Failed to initialize graph constraints")?;

    let bus = EventBus::connect(&config.bus)
        .await
        .context("Failed to connect to message bus")?;
    info!("✅ Subscribed to CDC topics");

    let shutdown = ShutdownSignal::install();
    let service = SyncService::new(bus, Projector::new(registry, gateway), shutdown);

    service.run().await?;
    Ok(())
}
