//! Index lifecycle management
//!
//! Owns the physical index behind the stable write alias. Two strategies,
//! selected once at startup:
//!
//! - [`RolloverManager`]: threshold-based rollover. Tracks the current
//!   generation's age/doc-count/store-size and swaps the alias write
//!   target to a fresh generation when any threshold crosses. Retired
//!   generations stay readable through the same alias.
//! - [`DailyIndex`]: fixed daily indices, `<alias>-<YYYY.MM.DD>`, created
//!   lazily on the first write of each UTC day. No rollover evaluation.
//!
//! The write pipeline only ever reads the current write target through
//! this module; reads go to the alias and never consult it.

mod daily;
mod rollover;

pub use daily::DailyIndex;
pub use rollover::RolloverManager;

use crate::elastic::EsError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// One physical generation behind the alias.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    /// Physical index name, `<alias>-<generation>`
    pub index: String,
    /// Generation number, starting at 1
    pub generation: u32,
    /// When this generation was created
    pub created_at: DateTime<Utc>,
    /// Documents flushed into this generation
    pub docs: u64,
    /// Serialized bytes flushed into this generation
    pub flushed_bytes: u64,
    /// Store size as last reported by the engine, when available
    pub store_bytes: Option<u64>,
}

impl IndexDescriptor {
    fn new(alias: &str, generation: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            index: generation_index_name(alias, generation),
            generation,
            created_at,
            docs: 0,
            flushed_bytes: 0,
            store_bytes: None,
        }
    }
}

/// Physical index name for a generation of an alias.
pub fn generation_index_name(alias: &str, generation: u32) -> String {
    format!("{alias}-{generation:06}")
}

/// Thresholds that trigger a rollover. Any single crossing triggers.
#[derive(Debug, Clone)]
pub struct RolloverPolicy {
    /// Max age of a generation since creation
    pub max_age: Duration,
    /// Max documents per generation, 0 to disable
    pub max_docs: u64,
    /// Max store size per generation; needs engine-reported usage,
    /// otherwise the size threshold stays inert
    pub max_size_bytes: Option<u64>,
}

impl Default for RolloverPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(7),
            max_docs: 1_000_000,
            max_size_bytes: None,
        }
    }
}

/// Pure rollover decision for a generation under a policy.
pub fn should_rollover(
    descriptor: &IndexDescriptor,
    policy: &RolloverPolicy,
    now: DateTime<Utc>,
) -> bool {
    if now - descriptor.created_at >= policy.max_age {
        return true;
    }
    if policy.max_docs > 0 && descriptor.docs >= policy.max_docs {
        return true;
    }
    if let (Some(max_size), Some(store)) = (policy.max_size_bytes, descriptor.store_bytes) {
        if store >= max_size {
            return true;
        }
    }
    false
}

/// Rollover failure. Never fatal in steady state: the old generation
/// keeps receiving writes and the next evaluation tick retries.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("storage engine error: {0}")]
    Storage(#[from] EsError),

    #[error("no write target exists for alias {0}")]
    NoWriteTarget(String),
}

/// The strategy behind the alias, fixed at startup.
pub enum IndexLifecycle {
    Rollover(RolloverManager),
    Daily(DailyIndex),
}

impl IndexLifecycle {
    /// Make sure a write target exists before the pipeline starts.
    pub async fn prepare(&self) -> Result<(), LifecycleError> {
        match self {
            IndexLifecycle::Rollover(m) => m.ensure_initial_index().await,
            // Daily indices are created lazily per day.
            IndexLifecycle::Daily(_) => Ok(()),
        }
    }

    /// Current physical write target.
    pub async fn write_target(&self) -> Result<String, LifecycleError> {
        match self {
            IndexLifecycle::Rollover(m) => m.write_target().await,
            IndexLifecycle::Daily(d) => d.write_target().await,
        }
    }

    /// Report a successful flush so counters feed the rollover decision.
    pub async fn record_flush(&self, docs: u64, bytes: u64) {
        if let IndexLifecycle::Rollover(m) = self {
            m.record_flush(docs, bytes).await;
        }
    }

    /// Spawn the periodic evaluation tick. No-op handle for daily mode.
    pub fn start_background_evaluation(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            let IndexLifecycle::Rollover(manager) = lifecycle.as_ref() else {
                return;
            };
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.evaluate(true).await {
                    tracing::warn!(error = %e, "Rollover evaluation failed, will retry next tick");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(docs: u64, age_hours: i64, store: Option<u64>) -> IndexDescriptor {
        IndexDescriptor {
            index: "prom-metrics-000001".to_string(),
            generation: 1,
            created_at: Utc::now() - Duration::hours(age_hours),
            docs,
            flushed_bytes: 0,
            store_bytes: store,
        }
    }

    fn policy() -> RolloverPolicy {
        RolloverPolicy {
            max_age: Duration::days(7),
            max_docs: 1_000_000,
            max_size_bytes: Some(5 * 1024 * 1024 * 1024),
        }
    }

    #[test]
    fn test_fresh_index_does_not_roll() {
        assert!(!should_rollover(&descriptor(10, 1, None), &policy(), Utc::now()));
    }

    #[test]
    fn test_doc_count_triggers_rollover() {
        assert!(should_rollover(
            &descriptor(1_000_000, 1, None),
            &policy(),
            Utc::now()
        ));
    }

    #[test]
    fn test_age_triggers_rollover() {
        assert!(should_rollover(
            &descriptor(10, 24 * 8, None),
            &policy(),
            Utc::now()
        ));
    }

    #[test]
    fn test_size_requires_engine_report() {
        let mut p = policy();
        p.max_size_bytes = Some(1024);
        // Size above threshold but unreported: threshold is inert.
        assert!(!should_rollover(&descriptor(10, 1, None), &p, Utc::now()));
        assert!(should_rollover(&descriptor(10, 1, Some(2048)), &p, Utc::now()));
    }

    #[test]
    fn test_zero_max_docs_disables_count_threshold() {
        let mut p = policy();
        p.max_docs = 0;
        assert!(!should_rollover(&descriptor(u64::MAX, 1, None), &p, Utc::now()));
    }

    #[test]
    fn test_generation_index_name_padding() {
        assert_eq!(generation_index_name("prom-metrics", 1), "prom-metrics-000001");
        assert_eq!(generation_index_name("prom-metrics", 42), "prom-metrics-000042");
    }
}
