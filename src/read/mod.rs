//! Remote-read query translation
//!
//! Maps a label-matcher query onto the Elasticsearch query DSL, runs a
//! single capped search against the alias, and reassembles the hits
//! into per-series, timestamp-ascending sample sequences.
//!
//! # Translation
//!
//! ```text
//! =   → bool.filter   term    label.<name>
//! !=  → bool.must_not term    label.<name>
//! =~  → bool.filter   regexp  label.<name>
//! !~  → bool.must_not regexp  label.<name>
//! [start, end] → bool.filter range timestamp (epoch millis)
//! ```

use crate::document::{series_key, StoredDoc};
use crate::elastic::api::ElasticApi;
use crate::elastic::EsError;
use crate::remote::{self, MatcherType};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Read service configuration.
#[derive(Debug, Clone)]
pub struct ReadConfig {
    /// Alias every search goes to; resolves to all generations
    pub alias: String,
    /// Result cap per search
    pub max_docs: usize,
}

/// One reconstructed series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    /// (timestamp ms, value), ascending by timestamp
    pub samples: Vec<(i64, f64)>,
}

/// Result of one read query.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub series: Vec<Series>,
    /// True when the match count exceeded the result cap and the
    /// returned samples were truncated.
    pub truncated: bool,
}

/// Per-request query failure. Never touches write-path state.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("search failed: {0}")]
    Storage(#[from] EsError),

    #[error("invalid regex for label {name}: {pattern}")]
    InvalidMatcher { name: String, pattern: String },
}

/// Translates and executes remote-read queries.
pub struct ReadService {
    api: Arc<dyn ElasticApi>,
    config: ReadConfig,
}

impl ReadService {
    pub fn new(api: Arc<dyn ElasticApi>, config: ReadConfig) -> Self {
        Self { api, config }
    }

    /// Execute one label-matcher query over a time range.
    pub async fn query(&self, query: &remote::Query) -> Result<QueryOutcome, QueryError> {
        // Nothing can match an empty selector or an inverted range.
        if query.matchers.is_empty() || query.end_timestamp_ms < query.start_timestamp_ms {
            return Ok(QueryOutcome::default());
        }

        let body = build_search_body(query, self.config.max_docs)?;
        let outcome = self.api.search(&self.config.alias, body).await?;

        let truncated = outcome.total > outcome.docs.len() as u64;
        if truncated {
            tracing::warn!(
                total = outcome.total,
                cap = self.config.max_docs,
                "Query matched more documents than the result cap, truncating"
            );
        }

        Ok(QueryOutcome {
            series: group_into_series(outcome.docs),
            truncated,
        })
    }
}

/// Build the search body for a query, capped at `max_docs` hits.
pub fn build_search_body(query: &remote::Query, max_docs: usize) -> Result<Value, QueryError> {
    let mut filter = vec![json!({
        "range": {
            "timestamp": {
                "gte": query.start_timestamp_ms,
                "lte": query.end_timestamp_ms,
                "format": "epoch_millis"
            }
        }
    })];
    let mut must_not = Vec::new();

    for matcher in &query.matchers {
        let field = format!("label.{}", matcher.name);
        let clause = match matcher.matcher_type() {
            MatcherType::Eq | MatcherType::Neq => json!({ "term": { field: matcher.value } }),
            MatcherType::Re | MatcherType::Nre => {
                // Reject patterns the engine would choke on before they
                // reach the wire.
                if regex::Regex::new(&matcher.value).is_err() {
                    return Err(QueryError::InvalidMatcher {
                        name: matcher.name.clone(),
                        pattern: matcher.value.clone(),
                    });
                }
                json!({ "regexp": { field: { "value": matcher.value } } })
            }
        };
        match matcher.matcher_type() {
            MatcherType::Eq | MatcherType::Re => filter.push(clause),
            MatcherType::Neq | MatcherType::Nre => must_not.push(clause),
        }
    }

    Ok(json!({
        "query": {
            "bool": {
                "filter": filter,
                "must_not": must_not
            }
        },
        "size": max_docs
    }))
}

/// Group documents by exact label set and sort each series ascending.
/// Documents whose value fails to decode are dropped with a warning.
fn group_into_series(docs: Vec<StoredDoc>) -> Vec<Series> {
    let mut buckets: BTreeMap<String, Series> = BTreeMap::new();

    for doc in docs {
        let timestamp = doc.timestamp;
        match doc.into_sample() {
            Ok(sample) => {
                buckets
                    .entry(series_key(&sample.labels))
                    .or_insert_with(|| Series {
                        labels: sample.labels.clone(),
                        samples: Vec::new(),
                    })
                    .samples
                    .push((sample.timestamp, sample.value));
            }
            Err(e) => {
                tracing::warn!(timestamp, error = %e, "Dropping document with undecodable value");
            }
        }
    }

    let mut series: Vec<Series> = buckets.into_values().collect();
    for s in &mut series {
        s.samples.sort_by_key(|(ts, _)| *ts);
    }
    series
}

/// Wire form of a result set.
pub fn to_query_result(outcome: &QueryOutcome) -> remote::QueryResult {
    remote::QueryResult {
        timeseries: outcome
            .series
            .iter()
            .map(|s| remote::TimeSeries {
                labels: s
                    .labels
                    .iter()
                    .map(|(name, value)| remote::Label {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                samples: s
                    .samples
                    .iter()
                    .map(|(timestamp, value)| remote::Sample {
                        value: *value,
                        timestamp: *timestamp,
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::encode_value;
    use crate::elastic::api::SearchOutcome;
    use crate::elastic::testing::MockElastic;
    use crate::remote::LabelMatcher;

    fn matcher(t: MatcherType, name: &str, value: &str) -> LabelMatcher {
        LabelMatcher {
            r#type: t as i32,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn query(matchers: Vec<LabelMatcher>) -> remote::Query {
        remote::Query {
            start_timestamp_ms: 1_700_000_000_000,
            end_timestamp_ms: 1_700_000_060_000,
            matchers,
        }
    }

    fn doc(job: &str, timestamp: i64, value: f64) -> StoredDoc {
        let mut label = BTreeMap::new();
        label.insert("__name__".to_string(), "up".to_string());
        label.insert("job".to_string(), job.to_string());
        StoredDoc {
            timestamp,
            value: encode_value(value),
            label,
        }
    }

    fn service(api: Arc<MockElastic>, max_docs: usize) -> ReadService {
        ReadService::new(
            api,
            ReadConfig {
                alias: "prom-metrics".to_string(),
                max_docs,
            },
        )
    }

    #[test]
    fn test_equals_matcher_becomes_term_filter() {
        let q = query(vec![matcher(MatcherType::Eq, "job", "node")]);
        let body = build_search_body(&q, 1000).unwrap();

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter[0]["range"]["timestamp"]["gte"], 1_700_000_000_000_i64);
        assert_eq!(filter[1]["term"]["label.job"].as_str().unwrap(), "node");
        assert_eq!(body["size"].as_u64().unwrap(), 1000);
    }

    #[test]
    fn test_negated_matchers_become_must_not() {
        let q = query(vec![
            matcher(MatcherType::Neq, "job", "node"),
            matcher(MatcherType::Nre, "instance", "host-.*"),
        ]);
        let body = build_search_body(&q, 10).unwrap();

        let must_not = body["query"]["bool"]["must_not"].as_array().unwrap();
        assert_eq!(must_not.len(), 2);
        assert_eq!(must_not[0]["term"]["label.job"].as_str().unwrap(), "node");
        assert_eq!(
            must_not[1]["regexp"]["label.instance"]["value"]
                .as_str()
                .unwrap(),
            "host-.*"
        );
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let q = query(vec![matcher(MatcherType::Re, "job", "(unclosed")]);
        assert!(matches!(
            build_search_body(&q, 10),
            Err(QueryError::InvalidMatcher { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_matchers_return_empty_without_searching() {
        let api = Arc::new(MockElastic::default());
        let svc = service(Arc::clone(&api), 1000);

        let outcome = svc.query(&query(vec![])).await.unwrap();

        assert!(outcome.series.is_empty());
        assert!(!outcome.truncated);
        assert!(api.search_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inverted_time_range_returns_empty() {
        let api = Arc::new(MockElastic::default());
        let svc = service(Arc::clone(&api), 1000);

        let mut q = query(vec![matcher(MatcherType::Eq, "job", "node")]);
        q.end_timestamp_ms = q.start_timestamp_ms - 1;
        let outcome = svc.query(&q).await.unwrap();

        assert!(outcome.series.is_empty());
        assert!(api.search_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_groups_by_label_set_and_sorts_ascending() {
        let api = Arc::new(MockElastic::default());
        *api.search_result.lock().unwrap() = SearchOutcome {
            total: 4,
            docs: vec![
                doc("node", 1_700_000_030_000, 3.0),
                doc("web", 1_700_000_010_000, 9.0),
                doc("node", 1_700_000_010_000, 1.0),
                doc("node", 1_700_000_020_000, 2.0),
            ],
        };
        let svc = service(Arc::clone(&api), 1000);

        let outcome = svc
            .query(&query(vec![matcher(MatcherType::Eq, "__name__", "up")]))
            .await
            .unwrap();

        assert_eq!(outcome.series.len(), 2);
        let node = outcome
            .series
            .iter()
            .find(|s| s.labels["job"] == "node")
            .unwrap();
        assert_eq!(
            node.samples,
            vec![
                (1_700_000_010_000, 1.0),
                (1_700_000_020_000, 2.0),
                (1_700_000_030_000, 3.0)
            ]
        );
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_truncation_flag_set_when_total_exceeds_cap() {
        let api = Arc::new(MockElastic::default());
        *api.search_result.lock().unwrap() = SearchOutcome {
            total: 5000,
            docs: (0..3)
                .map(|n| doc("node", 1_700_000_000_000 + n, n as f64))
                .collect(),
        };
        let svc = service(Arc::clone(&api), 3);

        let outcome = svc
            .query(&query(vec![matcher(MatcherType::Eq, "job", "node")]))
            .await
            .unwrap();

        assert!(outcome.truncated);
        let samples: usize = outcome.series.iter().map(|s| s.samples.len()).sum();
        assert_eq!(samples, 3);
    }

    #[tokio::test]
    async fn test_undecodable_value_dropped_not_fatal() {
        let api = Arc::new(MockElastic::default());
        let mut bad = doc("node", 1_700_000_020_000, 0.0);
        bad.value = "@@not-base64@@".to_string();
        *api.search_result.lock().unwrap() = SearchOutcome {
            total: 2,
            docs: vec![doc("node", 1_700_000_010_000, 1.0), bad],
        };
        let svc = service(Arc::clone(&api), 1000);

        let outcome = svc
            .query(&query(vec![matcher(MatcherType::Eq, "job", "node")]))
            .await
            .unwrap();

        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series[0].samples, vec![(1_700_000_010_000, 1.0)]);
    }

    #[test]
    fn test_to_query_result_preserves_order() {
        let outcome = QueryOutcome {
            series: vec![Series {
                labels: [("__name__".to_string(), "up".to_string())].into(),
                samples: vec![(1, 0.5), (2, 1.5)],
            }],
            truncated: false,
        };
        let result = to_query_result(&outcome);
        assert_eq!(result.timeseries.len(), 1);
        assert_eq!(result.timeseries[0].samples[0].timestamp, 1);
        assert_eq!(result.timeseries[0].samples[1].value, 1.5);
    }
}
