//! Batch worker
//!
//! Each worker is a single task owning one batch. It selects between its
//! sample channel and a ticker; both paths feed the same flush routine,
//! so appends and the age timer can never race over the batch.

use crate::document::Sample;
use crate::elastic::api::ElasticApi;
use crate::lifecycle::IndexLifecycle;
use crate::pipeline::batch::{Batch, BatchLimits};
use crate::pipeline::FlushRetry;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct Worker {
    pub id: usize,
    pub rx: mpsc::Receiver<Sample>,
    pub api: Arc<dyn ElasticApi>,
    pub lifecycle: Arc<IndexLifecycle>,
    pub limits: BatchLimits,
    pub retry: FlushRetry,
}

impl Worker {
    pub async fn run(mut self) {
        let mut batch = Batch::new();
        let mut ticker = tokio::time::interval(self.limits.max_age);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                sample = self.rx.recv() => {
                    match sample {
                        Some(sample) => {
                            if let Err(e) = batch.append(&sample) {
                                tracing::warn!(worker = self.id, error = %e, "Dropped unserializable sample");
                                continue;
                            }
                            if batch.should_flush(&self.limits) {
                                self.flush(&mut batch).await;
                            }
                        }
                        // Channel closed: shutdown. Flush the remainder.
                        None => {
                            self.flush(&mut batch).await;
                            tracing::debug!(worker = self.id, "Worker stopped");
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    // Stale partial batches must not sit unflushed.
                    if !batch.is_empty() && batch.age() >= self.limits.max_age {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }
    }

    /// Flush the current batch with bounded retries, then discard it.
    ///
    /// The write target is resolved once per flush: a rollover that
    /// lands mid-retry does not redirect this batch, the old index
    /// stays valid for it.
    async fn flush(&self, batch: &mut Batch) {
        if batch.is_empty() {
            return;
        }
        let taken = batch.take();
        let docs = taken.len();
        let bytes = taken.byte_size();
        let body = taken.into_body();

        let mut target: Option<String> = None;
        for attempt in 0..self.retry.max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff * 2u32.saturating_pow(attempt - 1)).await;
            }

            if target.is_none() {
                match self.lifecycle.write_target().await {
                    Ok(t) => target = Some(t),
                    Err(e) => {
                        tracing::warn!(worker = self.id, attempt, error = %e, "No write target yet");
                        continue;
                    }
                }
            }
            let index = target.as_deref().unwrap_or_default();

            match self.api.bulk(index, body.clone()).await {
                Ok(outcome) => {
                    if outcome.failed > 0 {
                        tracing::warn!(
                            worker = self.id,
                            index,
                            failed = outcome.failed,
                            "Bulk write accepted with item errors"
                        );
                    }
                    tracing::debug!(worker = self.id, index, docs, bytes, "Flushed batch");
                    self.lifecycle.record_flush(docs as u64, bytes as u64).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        worker = self.id,
                        index,
                        attempt,
                        docs,
                        error = %e,
                        "Bulk write failed"
                    );
                }
            }
        }

        // At-most-once after exhaustion: transient outages are retried,
        // unbounded ones drop the batch with a surfaced warning.
        tracing::error!(
            worker = self.id,
            docs,
            bytes,
            attempts = self.retry.max_attempts,
            "Dropping batch after exhausting flush retries"
        );
    }
}
