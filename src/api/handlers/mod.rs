//! S3 API request handlers
//!
//! Split into submodules by domain:
//! - `object` — GET, HEAD, PUT, DELETE for individual objects (and COPY)
//! - `bucket` — Bucket CRUD and listing
//! - `multipart` — Multipart upload lifecycle

mod bucket;
mod multipart;
mod object;

use super::errors::S3Error;
use crate::creds::CredentialRegistry;
use crate::engine::ObjectEngine;
use crate::meta::MetadataStore;
use crate::types::ObjectMeta;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

// Re-export all public handlers and types so callers don't change.
pub use bucket::{
    bucket_get_handler, create_bucket, delete_bucket, head_bucket, list_buckets, BucketGetQuery,
};
pub use multipart::post_object;
pub use object::{delete_object, get_object, head_object, put_object_or_copy};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<ObjectEngine>,
    pub meta: Arc<dyn MetadataStore>,
    pub creds: Arc<CredentialRegistry>,
    pub region: String,
}

/// Query parameters for object-level operations (multipart upload plus the
/// presigned-PUT constraint parameters).
#[derive(Debug, serde::Deserialize, Default)]
pub struct ObjectQuery {
    /// CreateMultipartUpload (POST with ?uploads)
    pub uploads: Option<String>,
    /// UploadPart / CompleteMultipartUpload / ListParts / Abort (?uploadId)
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    /// UploadPart (PUT with ?partNumber)
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
    /// Presigned-PUT body cap, honored when the signer embedded one
    #[serde(rename = "X-Amz-Max-Content-Length")]
    pub max_content_length: Option<u64>,
    /// Presigned-PUT content-type pin
    #[serde(rename = "X-Amz-Content-Type")]
    pub content_type_pin: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared utility functions used across handler submodules
// ---------------------------------------------------------------------------

/// Build response headers for an object: ETag (quoted), sizes, timestamps.
fn build_object_headers(meta: &ObjectMeta) -> HeaderMap {
    // itoa formats integers without a heap allocation; this runs on every
    // object response (GET, HEAD)
    let mut itoa_buf = itoa::Buffer::new();

    let mut headers = HeaderMap::new();
    headers.insert("ETag", hval(&meta.quoted_etag()));
    headers.insert("Content-Length", hval(itoa_buf.format(meta.size)));
    headers.insert("Content-Type", hval(&meta.content_type));
    headers.insert(
        "Last-Modified",
        hval(
            &meta
                .last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        ),
    );
    headers.insert("Accept-Ranges", HeaderValue::from_static("bytes"));
    headers
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Build an XML response with correct Content-Type header.
fn xml_response(xml: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "application/xml")],
        xml.into(),
    )
        .into_response()
}

/// Extract Content-Type header as an owned String, with the S3 default.
fn extract_content_type(headers: &HeaderMap) -> String {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Decode a Content-MD5 header into the lowercase hex form the blob store
/// compares against. Returns Err for a header that is present but not a
/// valid base64 MD5 digest.
fn content_md5_hex(headers: &HeaderMap) -> Result<Option<String>, S3Error> {
    use base64::Engine;

    let Some(raw) = headers.get("content-md5").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|_| S3Error::InvalidArgument("Invalid Content-MD5 encoding".to_string()))?;
    if decoded.len() != 16 {
        return Err(S3Error::InvalidArgument(
            "Content-MD5 must be a 128-bit digest".to_string(),
        ));
    }
    Ok(Some(hex::encode(decoded)))
}

/// Turn an axum request body into the blob store's stream type.
fn body_stream(body: Body) -> crate::storage::BodyStream {
    use futures::{StreamExt, TryStreamExt};
    body.into_data_stream()
        .map_err(std::io::Error::other)
        .boxed()
}

/// Declared Content-Length, when the client sent one.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// GET /health — liveness probe for load balancers and container runtimes.
pub async fn health_check() -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "application/json")],
        r#"{"status":"ok"}"#,
    )
        .into_response()
}

/// HEAD / — S3 clients probe connectivity this way before real requests.
pub async fn head_root() -> StatusCode {
    StatusCode::OK
}

/// Catch-all for method/resource combinations outside the dispatch matrix.
pub async fn method_not_allowed() -> S3Error {
    S3Error::MethodNotAllowed
}
