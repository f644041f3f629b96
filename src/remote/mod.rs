//! Prometheus remote read/write wire format
//!
//! Protobuf message definitions matching the upstream prometheus remote
//! storage protocol, plus the snappy framing both endpoints require.
//! Request and response bodies are raw-format snappy over the encoded
//! message.

use prost::Message;

/// Remote-write payload: a batch of time series with samples.
#[derive(Clone, PartialEq, Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// Remote-read payload: one or more label-matcher queries.
#[derive(Clone, PartialEq, Message)]
pub struct ReadRequest {
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Query>,
}

/// Remote-read response, one result per query in request order.
#[derive(Clone, PartialEq, Message)]
pub struct ReadResponse {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<QueryResult>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Query {
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    #[prost(message, repeated, tag = "3")]
    pub matchers: Vec<LabelMatcher>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryResult {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// Label matcher predicate type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    Eq = 0,
    Neq = 1,
    Re = 2,
    Nre = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct LabelMatcher {
    #[prost(enumeration = "MatcherType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub value: String,
}

impl LabelMatcher {
    /// Matcher type, defaulting unknown wire values to equality.
    pub fn matcher_type(&self) -> MatcherType {
        MatcherType::try_from(self.r#type).unwrap_or(MatcherType::Eq)
    }
}

impl WriteRequest {
    /// Flatten the request into individual storage samples.
    pub fn into_samples(self) -> Vec<crate::document::Sample> {
        let mut out = Vec::new();
        for series in self.timeseries {
            let labels: std::collections::BTreeMap<String, String> = series
                .labels
                .into_iter()
                .map(|l| (l.name, l.value))
                .collect();
            for sample in series.samples {
                out.push(crate::document::Sample::with_timestamp(
                    labels.clone(),
                    sample.value,
                    sample.timestamp,
                ));
            }
        }
        out
    }
}

/// Errors decoding a remote protocol body.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Decode a snappy-compressed protobuf body.
pub fn decode_body<M: Message + Default>(body: &[u8]) -> Result<M, ProtoError> {
    let raw = snap::raw::Decoder::new().decompress_vec(body)?;
    Ok(M::decode(raw.as_slice())?)
}

/// Encode a message as a snappy-compressed protobuf body.
pub fn encode_body<M: Message>(msg: &M) -> Vec<u8> {
    let raw = msg.encode_to_vec();
    // Raw-format compression of an in-memory buffer cannot fail.
    snap::raw::Encoder::new()
        .compress_vec(&raw)
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_write_request() -> WriteRequest {
        WriteRequest {
            timeseries: vec![TimeSeries {
                labels: vec![
                    Label {
                        name: "__name__".to_string(),
                        value: "up".to_string(),
                    },
                    Label {
                        name: "job".to_string(),
                        value: "node".to_string(),
                    },
                ],
                samples: vec![
                    Sample {
                        value: 1.0,
                        timestamp: 1_700_000_000_000,
                    },
                    Sample {
                        value: 0.0,
                        timestamp: 1_700_000_015_000,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_write_request_body_round_trip() {
        let req = sample_write_request();
        let body = encode_body(&req);
        let decoded: WriteRequest = decode_body(&body).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_decode_rejects_uncompressed_body() {
        let raw = sample_write_request().encode_to_vec();
        // Without the snappy layer decoding must fail cleanly.
        assert!(decode_body::<WriteRequest>(&raw).is_err());
    }

    #[test]
    fn test_into_samples_flattens_series() {
        let samples = sample_write_request().into_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].labels.get("job").unwrap(), "node");
        assert_eq!(samples[0].timestamp, 1_700_000_000_000);
        assert_eq!(samples[1].value, 0.0);
        // Both samples share one series identity.
        assert_eq!(samples[0].series_key(), samples[1].series_key());
    }

    #[test]
    fn test_matcher_type_fallback() {
        let m = LabelMatcher {
            r#type: 99,
            name: "job".to_string(),
            value: "node".to_string(),
        };
        assert_eq!(m.matcher_type(), MatcherType::Eq);
    }
}
