//! Application context.
//!
//! [`AppContext`] is the central struct shared across all route handlers via
//! Axum state. It only holds `Arc`s (the worker pool is itself a handle), so
//! cloning it per request is cheap.

use std::sync::Arc;

use mg_core::config::Config;
use mg_core::events::EventBus;
use mg_engine::{MediaEngine, ToolRegistry};

use crate::pool::WorkerPool;
use crate::registry::JobRegistry;

/// Application context shared by all request handlers (via Axum state).
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration.
    pub config: Arc<Config>,
    /// All known jobs.
    pub registry: Arc<JobRegistry>,
    /// Bounded pool for blocking engine calls, shared with the registry.
    pub pool: WorkerPool,
    /// The media engine used for inspection, search and retrieval.
    pub engine: Arc<dyn MediaEngine>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Broadcast event bus for SSE.
    pub event_bus: Arc<EventBus>,
}

impl AppContext {
    /// Wire a context around `engine`. Searches, inspections and retrievals
    /// all share one pool sized by `workers.capacity`.
    pub fn new(config: Config, engine: Arc<dyn MediaEngine>, tools: Arc<ToolRegistry>) -> Self {
        let pool = WorkerPool::new(config.workers.capacity);
        let event_bus = Arc::new(EventBus::default());
        let registry = Arc::new(JobRegistry::new(
            config.downloads.dir.clone(),
            pool.clone(),
            engine.clone(),
            event_bus.clone(),
        ));

        Self {
            config: Arc::new(config),
            registry,
            pool,
            engine,
            tools,
            event_bus,
        }
    }
}
