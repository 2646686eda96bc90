//! Ingestion endpoint
//!
//! `POST /` accepts an optional multipart attachment under the `image`
//! field, persists one record of the request, and returns the backend
//! identity, the five most recent records (newest first), and the
//! attachment re-encoded as base64.
//!
//! Externally the endpoint is reached through the ingress' path-stripping
//! rewrite (e.g. `/api/<name>` → `/`), so it is mounted at the root.

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

use crate::db::RequestRecord;
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;

/// How many records the read-back returns.
const RECENT_LIMIT: i64 = 5;

/// Response body for a successful ingestion
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Backend identity that handled the request
    pub backend: String,
    /// The most recent persisted records, newest first
    pub rows: Vec<RequestRecord>,
    /// The uploaded attachment re-encoded as base64, or null
    #[serde(rename = "uploadedImage")]
    pub uploaded_image: Option<String>,
}

/// Ingestion handler
///
/// The insert always runs before the read-back on this request's own
/// sequential await chain, so the new record is eligible to appear in the
/// returned rows. Database failures surface as a 500 with a diagnostic
/// payload; the per-query duration observation has already been recorded by
/// the store when that happens.
pub async fn handler(
    State(state): State<AppState>,
    request: Request,
) -> AppResult<Json<IngestResponse>> {
    let image = extract_image(request).await?;
    let uploaded = image.is_some();

    state.store().insert_request(uploaded, image.as_deref()).await?;
    let rows = state.store().recent_requests(RECENT_LIMIT).await?;

    Ok(Json(IngestResponse {
        backend: state.store().backend().to_string(),
        rows,
        uploaded_image: image.map(|bytes| STANDARD.encode(&bytes)),
    }))
}

/// Pull the `image` field out of a multipart body, if there is one.
///
/// Non-multipart requests are valid — they simply carry no attachment.
/// Malformed multipart payloads become a 400 via [`AppError::Multipart`].
async fn extract_image(request: Request) -> AppResult<Option<Bytes>> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("multipart/form-data"));
    if !is_multipart {
        return Ok(None);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?
    {
        if field.name() == Some("image") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Multipart(e.to_string()))?;
            return Ok(Some(bytes));
        }
    }

    Ok(None)
}
