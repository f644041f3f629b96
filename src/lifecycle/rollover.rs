//! Threshold-based rollover manager
//!
//! Holds the current generation descriptor plus the history of retired
//! generations behind one lock. The rollover decision and the write
//! target commit happen under that lock; the index creation and alias
//! swap network calls run outside it behind an in-flight claim, so
//! `write_target` never waits on the cluster. A flush that starts after
//! the commit sees the new target while flushes already dispatched
//! complete against the old index, which stays valid for writes the
//! engine already accepted.

use crate::elastic::api::ElasticApi;
use crate::elastic::EsError;
use crate::lifecycle::{
    generation_index_name, should_rollover, IndexDescriptor, LifecycleError, RolloverPolicy,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

struct ManagerState {
    current: Option<IndexDescriptor>,
    history: Vec<IndexDescriptor>,
    /// True while a rollover's network calls are in flight; at most one
    /// evaluation performs them at a time.
    rolling_over: bool,
}

/// Rollover lifecycle manager for one alias.
pub struct RolloverManager {
    api: Arc<dyn ElasticApi>,
    alias: String,
    policy: RolloverPolicy,
    state: RwLock<ManagerState>,
}

impl RolloverManager {
    pub fn new(api: Arc<dyn ElasticApi>, alias: impl Into<String>, policy: RolloverPolicy) -> Self {
        Self {
            api,
            alias: alias.into(),
            policy,
            state: RwLock::new(ManagerState {
                current: None,
                history: Vec::new(),
                rolling_over: false,
            }),
        }
    }

    /// Create generation 1 if the alias resolves to nothing, otherwise
    /// adopt the newest existing generation as the write target.
    pub async fn ensure_initial_index(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.write().await;
        if state.current.is_some() {
            return Ok(());
        }

        let mut existing = self.api.alias_indices(&self.alias).await?;
        if existing.is_empty() {
            let descriptor = IndexDescriptor::new(&self.alias, 1, Utc::now());
            self.api
                .create_index(
                    &descriptor.index,
                    json!({
                        "aliases": {
                            self.alias.clone(): { "is_write_index": true }
                        }
                    }),
                )
                .await?;
            tracing::info!(alias = %self.alias, index = %descriptor.index, "Created initial index");
            state.current = Some(descriptor);
        } else {
            existing.sort();
            let index = existing.pop().unwrap_or_default();
            let generation = parse_generation(&self.alias, &index).unwrap_or(1);
            let mut descriptor = IndexDescriptor::new(&self.alias, generation, Utc::now());
            descriptor.index = index;
            if let Ok(stats) = self.api.index_stats(&descriptor.index).await {
                descriptor.docs = stats.docs;
                descriptor.store_bytes = stats.store_bytes;
            }
            tracing::info!(
                alias = %self.alias,
                index = %descriptor.index,
                docs = descriptor.docs,
                "Adopted existing write index"
            );
            state.history.extend(
                existing
                    .into_iter()
                    .map(|index| adopted_descriptor(&self.alias, index)),
            );
            state.current = Some(descriptor);
        }
        Ok(())
    }

    /// Current physical write target.
    pub async fn write_target(&self) -> Result<String, LifecycleError> {
        let state = self.state.read().await;
        state
            .current
            .as_ref()
            .map(|d| d.index.clone())
            .ok_or_else(|| LifecycleError::NoWriteTarget(self.alias.clone()))
    }

    /// Fold a successful flush into the current generation's counters,
    /// then run a cheap evaluation (no stats refresh).
    pub async fn record_flush(&self, docs: u64, bytes: u64) {
        {
            let mut state = self.state.write().await;
            if let Some(current) = state.current.as_mut() {
                current.docs += docs;
                current.flushed_bytes += bytes;
            }
        }
        if let Err(e) = self.evaluate(false).await {
            tracing::warn!(error = %e, "Post-flush rollover evaluation failed");
        }
    }

    /// Evaluate the rollover decision and perform the swap when it
    /// fires. `refresh_stats` pulls engine-reported store usage first,
    /// which the size threshold requires.
    ///
    /// The lock is held only to decide and to commit, never across the
    /// network calls, so flushes keep resolving their write target while
    /// a rollover (or a failing creation) is in flight. The in-flight
    /// claim makes back-to-back evaluations on an unchanged descriptor
    /// produce at most one new generation.
    pub async fn evaluate(&self, refresh_stats: bool) -> Result<(), LifecycleError> {
        if refresh_stats && self.policy.max_size_bytes.is_some() {
            self.refresh_stats().await;
        }

        // Decide and claim.
        let (old_index, next) = {
            let mut state = self.state.write().await;
            if state.rolling_over {
                return Ok(());
            }
            let (old_index, next) = match state.current.as_ref() {
                Some(current) if should_rollover(current, &self.policy, Utc::now()) => (
                    current.index.clone(),
                    IndexDescriptor::new(&self.alias, current.generation + 1, Utc::now()),
                ),
                _ => return Ok(()),
            };
            state.rolling_over = true;
            (old_index, next)
        };

        let result = self.perform_rollover(&old_index, &next.index).await;

        // Commit (or back out) and release the claim.
        let mut state = self.state.write().await;
        state.rolling_over = false;
        match result {
            Ok(()) => {
                let retired = match state.current.as_mut() {
                    Some(current) if current.index == old_index => {
                        Some(std::mem::replace(current, next))
                    }
                    _ => None,
                };
                if let Some(retired) = retired {
                    tracing::info!(
                        alias = %self.alias,
                        old = %retired.index,
                        new = %state.current.as_ref().map(|c| c.index.as_str()).unwrap_or_default(),
                        docs = retired.docs,
                        "Rolled over write index"
                    );
                    state.history.push(retired);
                }
                Ok(())
            }
            Err(e) => {
                // Old generation stays the write target; retried next tick.
                tracing::warn!(
                    alias = %self.alias,
                    attempted = %next.index,
                    error = %e,
                    "Rollover failed, keeping current write index"
                );
                Err(e.into())
            }
        }
    }

    /// Pull engine-reported usage into the current descriptor. Reads the
    /// target without the lock held across the stats call.
    async fn refresh_stats(&self) {
        let Some(index) = ({
            let state = self.state.read().await;
            state.current.as_ref().map(|c| c.index.clone())
        }) else {
            return;
        };

        match self.api.index_stats(&index).await {
            Ok(stats) => {
                let mut state = self.state.write().await;
                if let Some(current) = state.current.as_mut() {
                    if current.index == index {
                        current.docs = current.docs.max(stats.docs);
                        current.store_bytes = stats.store_bytes;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Index stats unavailable, size threshold inert");
            }
        }
    }

    /// Create the next generation and repoint the alias in one atomic
    /// actions call: old index stays a read member, new index becomes
    /// the write target.
    async fn perform_rollover(&self, old_index: &str, new_index: &str) -> Result<(), EsError> {
        match self.api.create_index(new_index, json!({})).await {
            Ok(()) => {}
            // A previous attempt may have created the index before the
            // alias swap failed; proceed to the swap.
            Err(EsError::Api { status: 400, message })
                if message.contains("resource_already_exists_exception") => {}
            Err(e) => return Err(e),
        }

        self.api
            .update_aliases(json!({
                "actions": [
                    {
                        "add": {
                            "index": old_index,
                            "alias": self.alias.clone(),
                            "is_write_index": false
                        }
                    },
                    {
                        "add": {
                            "index": new_index,
                            "alias": self.alias.clone(),
                            "is_write_index": true
                        }
                    }
                ]
            }))
            .await
    }

    /// Retired generation count, for health reporting.
    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }
}

fn parse_generation(alias: &str, index: &str) -> Option<u32> {
    index
        .strip_prefix(alias)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

fn adopted_descriptor(alias: &str, index: String) -> IndexDescriptor {
    let generation = parse_generation(alias, &index).unwrap_or(0);
    let mut descriptor = IndexDescriptor::new(alias, generation, Utc::now());
    descriptor.index = index;
    descriptor
}
