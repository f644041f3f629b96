//! Remote-Read Route
//!
//! POST /read - Prometheus remote-read endpoint.
//!
//! The body is a snappy-compressed protobuf `ReadRequest`. Each query
//! is translated and executed independently; results come back in
//! request order as a compressed `ReadResponse`. When any query hit
//! the result cap, the `X-Promsink-Truncated: true` header is set so
//! callers can tell a complete answer from a clipped one.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::read::to_query_result;
use crate::remote::{decode_body, encode_body, ReadRequest, ReadResponse};

/// Response header flagging a result set clipped at the search cap.
pub const TRUNCATED_HEADER: &str = "x-promsink-truncated";

/// POST /read
pub async fn remote_read(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request: ReadRequest = decode_body(&body)?;

    let mut results = Vec::with_capacity(request.queries.len());
    let mut truncated = false;
    for query in &request.queries {
        let outcome = state.reader.query(query).await?;
        truncated |= outcome.truncated;
        results.push(to_query_result(&outcome));
    }

    let response = ReadResponse { results };
    let encoded = encode_body(&response);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static("snappy"),
    );
    if truncated {
        headers.insert(TRUNCATED_HEADER, HeaderValue::from_static("true"));
    }

    Ok((headers, encoded))
}
