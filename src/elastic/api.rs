//! Storage-engine capability trait
//!
//! The rest of the crate never touches HTTP directly; it consumes this
//! trait. [`crate::elastic::EsClient`] is the production implementation,
//! tests substitute an in-memory mock.

use crate::document::StoredDoc;
use crate::elastic::error::EsError;
use async_trait::async_trait;

/// Result of a bulk write.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOutcome {
    /// Items the cluster acknowledged
    pub items: usize,
    /// Items rejected with a per-item error
    pub failed: usize,
}

/// Result of a search against the alias.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// True total match count as reported by the cluster
    pub total: u64,
    /// Returned documents, at most the requested cap
    pub docs: Vec<StoredDoc>,
}

/// Storage usage for a single physical index.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    /// Primary document count
    pub docs: u64,
    /// Primary store size in bytes, when the engine reports it
    pub store_bytes: Option<u64>,
}

/// Operations the bridge needs from the document store.
#[async_trait]
pub trait ElasticApi: Send + Sync {
    /// Cheap liveness check against the cluster root.
    async fn ping(&self) -> Result<(), EsError>;

    /// Submit a newline-delimited bulk body against an index or alias.
    async fn bulk(&self, target: &str, body: String) -> Result<BulkOutcome, EsError>;

    /// Execute a search with the given query DSL body.
    async fn search(
        &self,
        target: &str,
        body: serde_json::Value,
    ) -> Result<SearchOutcome, EsError>;

    /// Create or update an index template.
    async fn put_index_template(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<(), EsError>;

    /// Create a physical index with the given settings/aliases body.
    async fn create_index(&self, index: &str, body: serde_json::Value) -> Result<(), EsError>;

    /// Apply a set of alias actions atomically.
    async fn update_aliases(&self, actions: serde_json::Value) -> Result<(), EsError>;

    /// Physical indices an alias currently resolves to (empty when the
    /// alias does not exist).
    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, EsError>;

    /// Document count and store size for one physical index.
    async fn index_stats(&self, index: &str) -> Result<IndexStats, EsError>;
}
