//! Multipart upload S3 handlers: InitiateMultipartUpload and
//! CompleteMultipartUpload. UploadPart/ListParts/Abort ride on the object
//! verb handlers.

use super::{extract_content_type, xml_response, AppState, ObjectQuery, S3Error};
use crate::api::extractors::ValidatedPath;
use crate::api::xml::{
    CompleteMultipartUploadRequest, CompleteMultipartUploadResult, InitiateMultipartUploadResult,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// CompleteMultipartUpload request bodies are small XML documents; anything
/// bigger than this is malformed or hostile.
const MAX_COMPLETE_BODY: usize = 10 * 1024 * 1024;

/// POST object handler — dispatches multipart operations by query param.
/// POST /{bucket}/{key}?uploads     -> InitiateMultipartUpload
/// POST /{bucket}/{key}?uploadId=X  -> CompleteMultipartUpload
#[instrument(skip(state, headers, body))]
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    if query.uploads.is_some() {
        initiate_multipart_upload(&state, &bucket, &key, &headers).await
    } else if let Some(upload_id) = &query.upload_id {
        complete_multipart_upload(&state, &bucket, &key, upload_id, body).await
    } else {
        Err(S3Error::MissingRequiredParameter(
            "uploads or uploadId".to_string(),
        ))
    }
}

/// POST /{bucket}/{key}?uploads — InitiateMultipartUpload
async fn initiate_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    info!("InitiateMultipartUpload {}/{}", bucket, key);

    let content_type = extract_content_type(headers);
    let upload = state
        .engine
        .initiate_upload(bucket, key, content_type)
        .await?;

    let xml = InitiateMultipartUploadResult {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload.upload_id,
    }
    .to_xml();
    Ok(xml_response(xml))
}

/// POST /{bucket}/{key}?uploadId=X — CompleteMultipartUpload
async fn complete_multipart_upload(
    state: &AppState,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: Bytes,
) -> Result<Response, S3Error> {
    info!(
        "CompleteMultipartUpload {}/{} uploadId={}",
        bucket, key, upload_id
    );

    if body.len() > MAX_COMPLETE_BODY {
        return Err(S3Error::InvalidArgument(
            "CompleteMultipartUpload body too large".to_string(),
        ));
    }

    let body_str = std::str::from_utf8(&body)
        .map_err(|_| S3Error::InvalidArgument("Request body is not valid XML".to_string()))?;
    let complete_req = CompleteMultipartUploadRequest::from_xml(body_str).map_err(|e| {
        warn!("Failed to parse CompleteMultipartUpload XML: {}", e);
        S3Error::InvalidArgument("Malformed CompleteMultipartUpload XML".to_string())
    })?;

    let requested_parts: Vec<(u32, String)> = complete_req
        .parts
        .iter()
        .map(|p| (p.part_number, p.etag.clone()))
        .collect();

    let object = state
        .engine
        .complete_upload(upload_id, bucket, key, &requested_parts)
        .await?;

    let xml = CompleteMultipartUploadResult {
        location: format!("/{}/{}", bucket, key),
        bucket: bucket.to_string(),
        key: key.to_string(),
        etag: object.etag,
    }
    .to_xml();
    Ok(xml_response(xml))
}
