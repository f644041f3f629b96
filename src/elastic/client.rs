//! Elasticsearch REST client
//!
//! HTTP client for the cluster operations the bridge consumes. Connection
//! bootstrap retries with a fixed delay up to a bounded attempt count;
//! exhausting the attempts is fatal to process startup.

use crate::document::StoredDoc;
use crate::elastic::api::{BulkOutcome, ElasticApi, IndexStats, SearchOutcome};
use crate::elastic::error::EsError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct EsClientConfig {
    /// Cluster base URL, e.g. "http://localhost:9200"
    pub url: String,
    /// Basic auth username, empty to disable
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// PEM client certificate path (requires `tls_key`)
    pub tls_cert: Option<String>,
    /// PEM client key path (requires `tls_cert`)
    pub tls_key: Option<String>,
    /// PEM CA bundle path
    pub tls_ca: Option<String>,
    /// Skip server certificate verification
    pub insecure_skip_verify: bool,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for EsClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: String::new(),
            password: String::new(),
            tls_cert: None,
            tls_key: None,
            tls_ca: None,
            insecure_skip_verify: false,
            request_timeout_ms: 10_000,
        }
    }
}

/// Explicit bootstrap retry policy: fixed delay, bounded attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(10),
        }
    }
}

/// Elasticsearch REST API client.
pub struct EsClient {
    client: Client,
    config: EsClientConfig,
}

impl EsClient {
    /// Build the client and verify connectivity, retrying per `retry`.
    ///
    /// Each failed attempt is logged with its number; running out of
    /// attempts returns the last error.
    pub async fn connect(config: EsClientConfig, retry: RetryPolicy) -> Result<Self, EsError> {
        let client = Self::build_http_client(&config)?;
        let es = Self { client, config };

        let mut last_err = EsError::Unavailable;
        for attempt in 1..=retry.max_attempts.max(1) {
            match es.ping().await {
                Ok(()) => {
                    tracing::info!(url = %es.config.url, "Connected to Elasticsearch");
                    return Ok(es);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "Failed to reach Elasticsearch, will retry"
                    );
                    last_err = e;
                }
            }
            if attempt < retry.max_attempts {
                tokio::time::sleep(retry.delay).await;
            }
        }
        Err(last_err)
    }

    /// Build an EsClient without the connectivity check.
    pub fn new(config: EsClientConfig) -> Result<Self, EsError> {
        let client = Self::build_http_client(&config)?;
        Ok(Self { client, config })
    }

    fn build_http_client(config: &EsClientConfig) -> Result<Client, EsError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(5));

        if let Some(ca_path) = &config.tls_ca {
            let pem = std::fs::read(ca_path)
                .map_err(|e| EsError::Tls(format!("read {ca_path}: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| EsError::Tls(format!("parse {ca_path}: {e}")))?;
            builder = builder.add_root_certificate(cert);
            tracing::info!(path = %ca_path, "Loaded TLS CA bundle");
        }

        match (&config.tls_cert, &config.tls_key) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path)
                    .map_err(|e| EsError::Tls(format!("read {cert_path}: {e}")))?;
                let key = std::fs::read(key_path)
                    .map_err(|e| EsError::Tls(format!("read {key_path}: {e}")))?;
                let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key)
                    .map_err(|e| EsError::Tls(format!("client identity: {e}")))?;
                builder = builder.identity(identity);
                tracing::info!("Loaded TLS client certificate");
            }
            (None, None) => {}
            _ => {
                return Err(EsError::Tls(
                    "tls_cert and tls_key must be set together".to_string(),
                ));
            }
        }

        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS server certificate verification disabled");
        }

        builder.build().map_err(EsError::Request)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        if self.config.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    async fn check_status(response: Response) -> Result<Response, EsError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(EsError::Api { status, message })
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    total: SearchTotal,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchTotal {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: StoredDoc,
}

#[async_trait]
impl ElasticApi for EsClient {
    async fn ping(&self) -> Result<(), EsError> {
        let response = self
            .authed(self.client.get(self.url("")))
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn bulk(&self, target: &str, body: String) -> Result<BulkOutcome, EsError> {
        let response = self
            .authed(self.client.post(self.url(&format!("{target}/_bulk"))))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| EsError::Parse(e.to_string()))?;

        let failed = if parsed.errors {
            parsed
                .items
                .iter()
                .filter(|item| {
                    item.get("index")
                        .and_then(|op| op.get("error"))
                        .is_some()
                })
                .count()
        } else {
            0
        };

        Ok(BulkOutcome {
            items: parsed.items.len(),
            failed,
        })
    }

    async fn search(
        &self,
        target: &str,
        body: serde_json::Value,
    ) -> Result<SearchOutcome, EsError> {
        let response = self
            .authed(self.client.post(self.url(&format!("{target}/_search"))))
            .json(&body)
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| EsError::Parse(e.to_string()))?;

        Ok(SearchOutcome {
            total: parsed.hits.total.value,
            docs: parsed.hits.hits.into_iter().map(|h| h.source).collect(),
        })
    }

    async fn put_index_template(
        &self,
        name: &str,
        body: serde_json::Value,
    ) -> Result<(), EsError> {
        let response = self
            .authed(
                self.client
                    .put(self.url(&format!("_index_template/{name}"))),
            )
            .json(&body)
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn create_index(&self, index: &str, body: serde_json::Value) -> Result<(), EsError> {
        let response = self
            .authed(self.client.put(self.url(index)))
            .json(&body)
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn update_aliases(&self, actions: serde_json::Value) -> Result<(), EsError> {
        let response = self
            .authed(self.client.post(self.url("_aliases")))
            .json(&actions)
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, EsError> {
        let response = self
            .authed(self.client.get(self.url(&format!("_alias/{alias}"))))
            .send()
            .await
            .map_err(EsError::from_reqwest)?;

        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response = Self::check_status(response).await?;

        let parsed: serde_json::Map<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| EsError::Parse(e.to_string()))?;
        Ok(parsed.keys().cloned().collect())
    }

    async fn index_stats(&self, index: &str) -> Result<IndexStats, EsError> {
        let response = self
            .authed(
                self.client
                    .get(self.url(&format!("{index}/_stats/docs,store"))),
            )
            .send()
            .await
            .map_err(EsError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EsError::Parse(e.to_string()))?;

        let primaries = parsed
            .pointer("/_all/primaries")
            .ok_or_else(|| EsError::Parse("missing _all.primaries in stats".to_string()))?;

        let docs = primaries
            .pointer("/docs/count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let store_bytes = primaries
            .pointer("/store/size_in_bytes")
            .and_then(|v| v.as_u64());

        Ok(IndexStats { docs, store_bytes })
    }
}
