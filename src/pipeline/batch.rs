//! Batch accumulation
//!
//! One worker owns one mutable [`Batch`] at a time. Samples append as
//! pre-serialized bulk lines so the byte threshold accounts for what
//! actually goes over the wire. A batch flushes when any of the three
//! limits crosses, and is discarded once flushed.

use crate::document::{Sample, StoredDoc};
use std::time::{Duration, Instant};

/// Flush thresholds. Crossing any one of them flushes the batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    /// Max elapsed time since the batch's first sample
    pub max_age: Duration,
    /// Max samples per batch
    pub max_docs: usize,
    /// Max serialized bulk-body bytes per batch
    pub max_size_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(10),
            max_docs: 1000,
            max_size_bytes: 4096,
        }
    }
}

/// An in-progress bulk request body.
#[derive(Debug, Default)]
pub struct Batch {
    body: String,
    count: usize,
    first_append: Option<Instant>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample as an action line plus a document line.
    pub fn append(&mut self, sample: &Sample) -> Result<(), serde_json::Error> {
        let doc = serde_json::to_string(&StoredDoc::from_sample(sample))?;
        self.body.push_str("{\"index\":{}}\n");
        self.body.push_str(&doc);
        self.body.push('\n');
        self.count += 1;
        self.first_append.get_or_insert_with(Instant::now);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn byte_size(&self) -> usize {
        self.body.len()
    }

    /// Time since the first sample was appended; zero while empty.
    pub fn age(&self) -> Duration {
        self.first_append
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// True when any limit is crossed. Checked after every append; the
    /// worker's ticker covers the age limit when no appends arrive.
    pub fn should_flush(&self, limits: &BatchLimits) -> bool {
        !self.is_empty()
            && (self.count >= limits.max_docs
                || self.body.len() >= limits.max_size_bytes
                || self.age() >= limits.max_age)
    }

    /// Take the accumulated body, resetting the batch. The returned
    /// body is flushed exactly once and never touched again.
    pub fn take(&mut self) -> Batch {
        std::mem::take(self)
    }

    /// Consume into the bulk request body.
    pub fn into_body(self) -> String {
        self.body
    }
}
