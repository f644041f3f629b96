//! Elasticsearch boundary
//!
//! Everything that talks to the cluster lives here:
//! - [`EsClient`]: reqwest-based REST client with startup retry
//! - [`ElasticApi`]: the capability trait consumed by the write pipeline,
//!   the index lifecycle manager and the read service
//! - [`ensure_template`]: idempotent index-template bootstrap

pub mod api;
pub mod client;
pub mod error;
pub mod template;
#[cfg(test)]
pub(crate) mod testing;

pub use api::{BulkOutcome, ElasticApi, IndexStats, SearchOutcome};
pub use client::{EsClient, RetryPolicy};
pub use error::EsError;
pub use template::{ensure_template, TemplateError};
