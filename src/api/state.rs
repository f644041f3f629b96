//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::elastic::api::ElasticApi;
use crate::pipeline::WritePipeline;
use crate::read::ReadService;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Batching write pipeline for ingested samples
    pub pipeline: Arc<WritePipeline>,
    /// Remote-read query translator
    pub reader: Arc<ReadService>,
    /// Storage client, used directly only by health probes
    pub elastic: Arc<dyn ElasticApi>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<WritePipeline>,
        reader: Arc<ReadService>,
        elastic: Arc<dyn ElasticApi>,
    ) -> Self {
        Self {
            pipeline,
            reader,
            elastic,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Listener configuration for one HTTP surface
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl ListenConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
