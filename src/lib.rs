//! # Promsink
//!
//! Prometheus remote storage adapter for Elasticsearch. Accepts
//! remote-write traffic, batches samples into bulk requests, manages
//! the backing indices, and answers remote-read queries.
//!
//! ## Modules
//!
//! - [`remote`]: Prometheus remote wire protocol (protobuf over snappy)
//! - [`document`]: sample and stored-document shapes
//! - [`pipeline`]: batching write pipeline
//! - [`lifecycle`]: index rollover and daily-index management
//! - [`read`]: remote-read query translation
//! - [`elastic`]: Elasticsearch HTTP client
//! - [`api`]: HTTP listeners, built with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promsink::api::{serve, AppState, ListenConfig};
//! use promsink::config::Config;
//! use promsink::elastic::{ElasticApi, EsClient};
//! use promsink::lifecycle::{IndexLifecycle, RolloverManager};
//! use promsink::pipeline::WritePipeline;
//! use promsink::read::{ReadConfig, ReadService};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = EsClient::connect(
//!         config.elasticsearch.client_config(),
//!         config.elasticsearch.retry_policy(),
//!     )
//!     .await?;
//!     let elastic: Arc<dyn ElasticApi> = Arc::new(client);
//!
//!     let manager = RolloverManager::new(
//!         Arc::clone(&elastic),
//!         config.index.alias.as_str(),
//!         config.index.rollover_policy()?,
//!     );
//!     let lifecycle = Arc::new(IndexLifecycle::Rollover(manager));
//!     lifecycle.prepare().await?;
//!
//!     let pipeline = Arc::new(WritePipeline::new(
//!         Arc::clone(&elastic),
//!         Arc::clone(&lifecycle),
//!         config.batch.pipeline_config(Duration::from_secs(30)),
//!     ));
//!     let reader = Arc::new(ReadService::new(
//!         Arc::clone(&elastic),
//!         ReadConfig {
//!             alias: config.index.alias.clone(),
//!             max_docs: config.search.max_docs,
//!         },
//!     ));
//!
//!     let state = Arc::new(AppState::new(pipeline, reader, elastic));
//!     serve(state, &ListenConfig::new("0.0.0.0", 8000)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod document;
pub mod elastic;
pub mod lifecycle;
pub mod pipeline;
pub mod read;
pub mod remote;

// Re-export top-level types for convenience
pub use api::{build_admin_router, build_router, serve, serve_admin, ApiError, AppState, ListenConfig};

pub use config::{Config, ConfigError};

pub use document::{Sample, StoredDoc};

pub use elastic::{ElasticApi, EsClient, EsError, RetryPolicy};

pub use lifecycle::{
    DailyIndex, IndexLifecycle, LifecycleError, RolloverManager, RolloverPolicy,
};

pub use pipeline::{BatchLimits, PipelineConfig, PipelineError, WritePipeline};

pub use read::{QueryError, QueryOutcome, ReadConfig, ReadService};
