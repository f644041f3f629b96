//! Remote-Write Route
//!
//! POST /write - Prometheus remote-write endpoint.
//!
//! The body is a snappy-compressed protobuf `WriteRequest`. Samples are
//! flattened and enqueued into the write pipeline; 200 acknowledges
//! acceptance into the pipeline, not durable storage.

use axum::{body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::remote::{decode_body, WriteRequest};

/// POST /write
pub async fn remote_write(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let request: WriteRequest = decode_body(&body)?;
    let samples = request.into_samples();
    let count = samples.len();

    for sample in samples {
        state.pipeline.submit(sample).await?;
    }

    tracing::debug!(samples = count, "Accepted remote-write request");
    Ok(StatusCode::OK)
}
