//! Stored document model
//!
//! Defines the shape of a sample as it lives in Elasticsearch:
//! an epoch-millisecond `timestamp`, a `label` object with one keyword
//! field per label, and a `value` holding the base64-encoded big-endian
//! bits of the 64-bit float (the index maps `value` as binary).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single time-series sample accepted from remote write.
///
/// Labels are kept in a BTreeMap so two samples with the same label
/// content always compare and group equal regardless of input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Label set identifying the series
    pub labels: BTreeMap<String, String>,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Measured value
    pub value: f64,
}

impl Sample {
    /// Create a sample with the current timestamp
    pub fn new(labels: BTreeMap<String, String>, value: f64) -> Self {
        Self {
            labels,
            timestamp: Utc::now().timestamp_millis(),
            value,
        }
    }

    /// Create a sample with a specific timestamp
    pub fn with_timestamp(labels: BTreeMap<String, String>, value: f64, timestamp: i64) -> Self {
        Self {
            labels,
            timestamp,
            value,
        }
    }

    /// Canonical series identity: labels joined in key order.
    pub fn series_key(&self) -> String {
        series_key(&self.labels)
    }
}

/// Canonical series key for a label set.
pub fn series_key(labels: &BTreeMap<String, String>) -> String {
    let mut key = String::new();
    for (name, value) in labels {
        key.push_str(name);
        key.push('=');
        key.push_str(value);
        key.push('\u{1f}');
    }
    key
}

/// Document form written to and read from the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDoc {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Base64-encoded big-endian f64 bits
    pub value: String,
    /// Label set, indexed as `label.<name>` keyword fields
    #[serde(default)]
    pub label: BTreeMap<String, String>,
}

impl StoredDoc {
    /// Build the document form of a sample.
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            value: encode_value(sample.value),
            label: sample.labels.clone(),
        }
    }

    /// Decode back into a sample. Fails only on a malformed `value`.
    pub fn into_sample(self) -> Result<Sample, DecodeError> {
        let value = decode_value(&self.value)?;
        Ok(Sample {
            labels: self.label,
            timestamp: self.timestamp,
            value,
        })
    }
}

/// Encode a float value for storage.
pub fn encode_value(value: f64) -> String {
    BASE64.encode(value.to_be_bytes())
}

/// Decode a stored value back into a float.
pub fn decode_value(encoded: &str) -> Result<f64, DecodeError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    let arr: [u8; 8] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| DecodeError::Length(bytes.len()))?;
    Ok(f64::from_be_bytes(arr))
}

/// Per-document decode failure. Dropped from results with a warning,
/// never fatal to a query.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid base64 value: {0}")]
    Base64(String),

    #[error("decoded value is {0} bytes, expected 8")]
    Length(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_value_round_trip() {
        for v in [0.0, -1.5, 42.25, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(decode_value(&encode_value(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_value_nan_round_trip() {
        let decoded = decode_value(&encode_value(f64::NAN)).unwrap();
        assert!(decoded.is_nan());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_value("not base64!!!").is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let short = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_value(&short),
            Err(DecodeError::Length(3))
        ));
    }

    #[test]
    fn test_series_key_order_independent() {
        let a = labels(&[("job", "node"), ("__name__", "up")]);
        let b = labels(&[("__name__", "up"), ("job", "node")]);
        assert_eq!(series_key(&a), series_key(&b));
    }

    #[test]
    fn test_series_key_distinguishes_values() {
        let a = labels(&[("job", "node")]);
        let b = labels(&[("job", "web")]);
        assert_ne!(series_key(&a), series_key(&b));
    }

    #[test]
    fn test_stored_doc_round_trip() {
        let sample = Sample::with_timestamp(labels(&[("__name__", "up")]), 1.0, 1_700_000_000_000);
        let doc = StoredDoc::from_sample(&sample);
        assert_eq!(doc.into_sample().unwrap(), sample);
    }
}
