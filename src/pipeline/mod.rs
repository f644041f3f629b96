//! Batch write pipeline
//!
//! The ingestion hot path. `submit` only enqueues: samples are routed
//! round-robin to a fixed pool of workers, each owning one mutable
//! batch bounded by age, count and serialized size. Flush outcomes
//! never reach the caller; acceptance is acknowledged at enqueue time.
//!
//! No cross-worker ordering is promised. Within one worker, samples
//! flush in append order.

pub mod batch;
mod worker;

pub use batch::{Batch, BatchLimits};

use crate::document::Sample;
use crate::elastic::api::ElasticApi;
use crate::lifecycle::IndexLifecycle;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use worker::Worker;

/// Bounded retry applied to a failed flush before the batch is dropped.
#[derive(Debug, Clone, Copy)]
pub struct FlushRetry {
    pub max_attempts: u32,
    /// Base delay, doubled per attempt
    pub backoff: Duration,
}

impl Default for FlushRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Pipeline construction parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker pool size
    pub workers: usize,
    pub limits: BatchLimits,
    pub retry: FlushRetry,
    /// Per-worker channel depth
    pub queue_depth: usize,
    /// How long `close` waits for in-flight flushes
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            limits: BatchLimits::default(),
            retry: FlushRetry::default(),
            queue_depth: 10_000,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors visible to ingestion callers.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The pipeline is shutting down and no longer accepts samples.
    #[error("pipeline is shutting down")]
    Rejected,
}

/// The batching write pipeline.
pub struct WritePipeline {
    senders: Mutex<Vec<tokio::sync::mpsc::Sender<Sample>>>,
    next_worker: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl WritePipeline {
    /// Spawn the worker pool.
    pub fn new(
        api: Arc<dyn ElasticApi>,
        lifecycle: Arc<IndexLifecycle>,
        config: PipelineConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let (tx, rx) = tokio::sync::mpsc::channel(config.queue_depth.max(1));
            let worker = Worker {
                id,
                rx,
                api: Arc::clone(&api),
                lifecycle: Arc::clone(&lifecycle),
                limits: config.limits,
                retry: config.retry,
            };
            senders.push(tx);
            handles.push(tokio::spawn(worker.run()));
        }

        tracing::info!(workers, "Write pipeline started");
        Self {
            senders: Mutex::new(senders),
            next_worker: AtomicUsize::new(0),
            handles: Mutex::new(handles),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Enqueue a sample. Returns once the sample is queued, not once it
    /// is durably flushed; fails only when the pipeline is closing.
    pub async fn submit(&self, sample: Sample) -> Result<(), PipelineError> {
        let sender = {
            let senders = self.senders.lock().unwrap();
            if senders.is_empty() {
                return Err(PipelineError::Rejected);
            }
            let n = self.next_worker.fetch_add(1, Ordering::Relaxed);
            senders[n % senders.len()].clone()
        };
        sender.send(sample).await.map_err(|_| PipelineError::Rejected)
    }

    /// Stop accepting samples, flush every worker's remainder and wait
    /// for in-flight flushes up to the shutdown timeout.
    pub async fn close(&self) {
        // Dropping the senders closes each worker's channel, which
        // triggers its final flush.
        self.senders.lock().unwrap().clear();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            if tokio::time::timeout(self.shutdown_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!("Worker did not finish flushing before shutdown timeout");
            }
        }
        tracing::info!("Write pipeline closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::testing::MockElastic;
    use crate::lifecycle::{RolloverManager, RolloverPolicy};
    use std::collections::BTreeMap;

    fn sample(n: u64) -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("__name__".to_string(), "up".to_string());
        Sample::with_timestamp(labels, n as f64, 1_700_000_000_000 + n as i64)
    }

    async fn pipeline_with(
        api: Arc<MockElastic>,
        config: PipelineConfig,
    ) -> (WritePipeline, Arc<IndexLifecycle>) {
        let manager = RolloverManager::new(
            Arc::clone(&api) as Arc<dyn ElasticApi>,
            "prom-metrics",
            RolloverPolicy::default(),
        );
        let lifecycle = Arc::new(IndexLifecycle::Rollover(manager));
        lifecycle.prepare().await.unwrap();
        let pipeline = WritePipeline::new(api, Arc::clone(&lifecycle), config);
        (pipeline, lifecycle)
    }

    #[tokio::test]
    async fn test_count_threshold_flushes_without_waiting() {
        let api = Arc::new(MockElastic::default());
        let config = PipelineConfig {
            workers: 1,
            limits: BatchLimits {
                max_age: Duration::from_secs(60),
                max_docs: 1000,
                max_size_bytes: usize::MAX,
            },
            ..Default::default()
        };
        let (pipeline, _lifecycle) = pipeline_with(Arc::clone(&api), config).await;

        for n in 0..500 {
            pipeline.submit(sample(n)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.bulk_doc_count(), 0);

        for n in 500..1001 {
            pipeline.submit(sample(n)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Flushed by the count threshold, well before max_age.
        assert_eq!(api.bulk_doc_count(), 1000);

        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_every_sample_lands_in_exactly_one_batch() {
        let api = Arc::new(MockElastic::default());
        let config = PipelineConfig {
            workers: 4,
            limits: BatchLimits {
                max_age: Duration::from_secs(60),
                max_docs: 7,
                max_size_bytes: usize::MAX,
            },
            ..Default::default()
        };
        let (pipeline, _lifecycle) = pipeline_with(Arc::clone(&api), config).await;

        for n in 0..100 {
            pipeline.submit(sample(n)).await.unwrap();
        }
        pipeline.close().await;

        assert_eq!(api.bulk_doc_count(), 100);
        // No flushed batch exceeded the count limit.
        for (_, body) in api.bulk_calls.lock().unwrap().iter() {
            assert!(body.lines().count() / 2 <= 7);
        }
    }

    #[tokio::test]
    async fn test_age_ticker_flushes_stale_batch() {
        let api = Arc::new(MockElastic::default());
        let config = PipelineConfig {
            workers: 1,
            limits: BatchLimits {
                max_age: Duration::from_millis(50),
                max_docs: 1000,
                max_size_bytes: usize::MAX,
            },
            ..Default::default()
        };
        let (pipeline, _lifecycle) = pipeline_with(Arc::clone(&api), config).await;

        pipeline.submit(sample(0)).await.unwrap();
        // No further appends; the ticker alone must flush it.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(api.bulk_doc_count(), 1);

        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let api = Arc::new(MockElastic::default());
        let (pipeline, _lifecycle) =
            pipeline_with(Arc::clone(&api), PipelineConfig::default()).await;

        pipeline.close().await;
        assert!(matches!(
            pipeline.submit(sample(0)).await,
            Err(PipelineError::Rejected)
        ));
    }

    #[tokio::test]
    async fn test_transient_bulk_failure_is_retried() {
        let api = Arc::new(MockElastic::default());
        api.fail_bulk_times.store(1, Ordering::SeqCst);
        let config = PipelineConfig {
            workers: 1,
            limits: BatchLimits {
                max_age: Duration::from_secs(60),
                max_docs: 2,
                max_size_bytes: usize::MAX,
            },
            retry: FlushRetry {
                max_attempts: 3,
                backoff: Duration::from_millis(10),
            },
            ..Default::default()
        };
        let (pipeline, _lifecycle) = pipeline_with(Arc::clone(&api), config).await;

        pipeline.submit(sample(0)).await.unwrap();
        pipeline.submit(sample(1)).await.unwrap();
        pipeline.close().await;

        // First attempt failed, the retry carried the same batch through.
        assert_eq!(api.bulk_doc_count(), 2);
    }

    #[tokio::test]
    async fn test_flush_feeds_rollover_counters() {
        let api = Arc::new(MockElastic::default());
        let config = PipelineConfig {
            workers: 1,
            limits: BatchLimits {
                max_age: Duration::from_secs(60),
                max_docs: 5,
                max_size_bytes: usize::MAX,
            },
            ..Default::default()
        };

        let manager = RolloverManager::new(
            Arc::clone(&api) as Arc<dyn ElasticApi>,
            "prom-metrics",
            RolloverPolicy {
                max_age: chrono::Duration::days(7),
                max_docs: 5,
                max_size_bytes: None,
            },
        );
        let lifecycle = Arc::new(IndexLifecycle::Rollover(manager));
        lifecycle.prepare().await.unwrap();
        let pipeline = WritePipeline::new(
            Arc::clone(&api) as Arc<dyn ElasticApi>,
            Arc::clone(&lifecycle),
            config,
        );

        for n in 0..5 {
            pipeline.submit(sample(n)).await.unwrap();
        }
        pipeline.close().await;

        // The flushed doc count pushed generation 1 over its limit.
        assert_eq!(
            lifecycle.write_target().await.unwrap(),
            "prom-metrics-000002"
        );
        // The flush itself targeted the generation current at dispatch.
        let calls = api.bulk_calls.lock().unwrap();
        assert_eq!(calls[0].0, "prom-metrics-000001");
    }
}
