//! Object size ceiling.
//!
//! Two checks share one limit: a declared `Content-Length` above the limit is
//! refused before the handler runs, and the body stream itself stops with an
//! error once more than the limit has been read.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, StatusCode};
use storage::ByteStream;

use crate::ServiceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("unparseable content length")]
    InvalidContentLength,
}

impl IntoResponse for PayloadError {
    fn into_response(self) -> Response {
        match self {
            PayloadError::TooLarge { .. } => {
                (StatusCode::BAD_REQUEST, "File too large").into_response()
            }
            PayloadError::InvalidContentLength => {
                (StatusCode::BAD_REQUEST, "Bad request").into_response()
            }
        }
    }
}

/// The request's declared body length, if it has one.
pub fn declared_length(headers: &HeaderMap) -> Result<Option<u64>, PayloadError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or(PayloadError::InvalidContentLength)
}

/// Refuse requests whose declared length is over the limit without reading
/// the body or calling a node.
pub async fn enforce_declared_length(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.max_payload_bytes();
    match declared_length(request.headers()) {
        Ok(Some(length)) if length > limit => {
            tracing::warn!(length, limit, "rejecting oversized payload");
            PayloadError::TooLarge { limit }.into_response()
        }
        Ok(_) => next.run(request).await,
        Err(e) => {
            tracing::debug!("rejecting request: {}", e);
            e.into_response()
        }
    }
}

/// Records that a body stream was cut off at the limit.
#[derive(Debug, Clone, Default)]
pub struct Tripwire(Arc<AtomicBool>);

impl Tripwire {
    fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wrap a request body so it fails once more than `limit` bytes have passed.
///
/// The returned tripwire tells the caller afterwards whether a failure came
/// from the limit rather than from the node.
pub fn limit_body(body: Body, limit: u64) -> (ByteStream, Tripwire) {
    let tripwire = Tripwire::default();
    let cut = tripwire.clone();
    let mut seen: u64 = 0;

    let stream = body
        .into_data_stream()
        .map(move |chunk| {
            let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            seen += chunk.len() as u64;
            if seen > limit {
                cut.trip();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    PayloadError::TooLarge { limit },
                ));
            }
            Ok(chunk)
        })
        .boxed();

    (stream, tripwire)
}
