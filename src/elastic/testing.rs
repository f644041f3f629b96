//! In-memory [`ElasticApi`] stand-in for unit tests.

use crate::elastic::api::{BulkOutcome, ElasticApi, IndexStats, SearchOutcome};
use crate::elastic::error::EsError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every call and lets tests inject failures and canned results.
#[derive(Default)]
pub(crate) struct MockElastic {
    pub created: Mutex<Vec<String>>,
    pub alias_calls: Mutex<Vec<serde_json::Value>>,
    /// (target, body) per bulk call
    pub bulk_calls: Mutex<Vec<(String, String)>>,
    pub search_calls: Mutex<Vec<(String, serde_json::Value)>>,
    pub existing_alias: Mutex<Vec<String>>,
    pub stats: Mutex<IndexStats>,
    pub search_result: Mutex<SearchOutcome>,
    /// Fail create_index with Unavailable
    pub fail_create: AtomicBool,
    /// Answer create_index with resource_already_exists
    pub create_conflict: AtomicBool,
    /// Fail this many bulk calls before succeeding
    pub fail_bulk_times: AtomicUsize,
    /// Sleep this long inside create_index, to model a slow cluster
    pub create_delay_ms: AtomicU64,
}

impl MockElastic {
    /// Total documents across all accepted bulk bodies (two NDJSON
    /// lines per document).
    pub fn bulk_doc_count(&self) -> usize {
        self.bulk_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.lines().count() / 2)
            .sum()
    }
}

#[async_trait]
impl ElasticApi for MockElastic {
    async fn ping(&self) -> Result<(), EsError> {
        Ok(())
    }

    async fn bulk(&self, target: &str, body: String) -> Result<BulkOutcome, EsError> {
        if self
            .fail_bulk_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EsError::Unavailable);
        }
        let items = body.lines().count() / 2;
        self.bulk_calls
            .lock()
            .unwrap()
            .push((target.to_string(), body));
        Ok(BulkOutcome { items, failed: 0 })
    }

    async fn search(
        &self,
        target: &str,
        body: serde_json::Value,
    ) -> Result<SearchOutcome, EsError> {
        self.search_calls
            .lock()
            .unwrap()
            .push((target.to_string(), body));
        Ok(self.search_result.lock().unwrap().clone())
    }

    async fn put_index_template(
        &self,
        _name: &str,
        _body: serde_json::Value,
    ) -> Result<(), EsError> {
        Ok(())
    }

    async fn create_index(&self, index: &str, _body: serde_json::Value) -> Result<(), EsError> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EsError::Unavailable);
        }
        if self.create_conflict.load(Ordering::SeqCst) {
            return Err(EsError::Api {
                status: 400,
                message: "resource_already_exists_exception".to_string(),
            });
        }
        self.created.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn update_aliases(&self, actions: serde_json::Value) -> Result<(), EsError> {
        self.alias_calls.lock().unwrap().push(actions);
        Ok(())
    }

    async fn alias_indices(&self, _alias: &str) -> Result<Vec<String>, EsError> {
        Ok(self.existing_alias.lock().unwrap().clone())
    }

    async fn index_stats(&self, _index: &str) -> Result<IndexStats, EsError> {
        Ok(*self.stats.lock().unwrap())
    }
}
