//! Object-level S3 handlers: GET (with Range), HEAD, PUT (with copy and
//! upload-part detection), DELETE (with multipart abort).

use super::{
    body_stream, build_object_headers, content_length, content_md5_hex, extract_content_type,
    hval, xml_response, AppState, ObjectQuery, S3Error,
};
use crate::api::extractors::ValidatedPath;
use crate::api::xml::{CopyObjectResult, ListPartsResult, PartInfo};
use crate::types::{validate_bucket_name, validate_object_key};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};

/// A `Range: bytes=a-b` header that cannot be satisfied against the object.
struct Unsatisfiable;

/// Resolve a Range header against an object of `size` bytes.
///
/// Returns `Ok(None)` for absent/malformed/multi-range headers (serve the
/// full body), `Ok(Some((start, end)))` for a satisfiable range (inclusive
/// bounds), and `Err` for a parseable but unsatisfiable one (416).
fn resolve_range(header: &str, size: u64) -> Result<Option<(u64, u64)>, Unsatisfiable> {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return Ok(None);
    };
    // Multi-range requests are served as a full response
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((first, last)) = spec.split_once('-') else {
        return Ok(None);
    };
    let (first, last) = (first.trim(), last.trim());

    match (first.is_empty(), last.is_empty()) {
        (true, true) => Ok(None),
        // Suffix range: the last `n` bytes
        (true, false) => {
            let Ok(n) = last.parse::<u64>() else {
                return Ok(None);
            };
            if n == 0 || size == 0 {
                return Err(Unsatisfiable);
            }
            Ok(Some((size.saturating_sub(n), size - 1)))
        }
        // Open-ended range: from `start` to the end
        (false, true) => {
            let Ok(start) = first.parse::<u64>() else {
                return Ok(None);
            };
            if start >= size {
                return Err(Unsatisfiable);
            }
            Ok(Some((start, size - 1)))
        }
        (false, false) => {
            let (Ok(start), Ok(end)) = (first.parse::<u64>(), last.parse::<u64>()) else {
                return Ok(None);
            };
            if start > end || start >= size {
                return Err(Unsatisfiable);
            }
            Ok(Some((start, end.min(size - 1))))
        }
    }
}

fn io_internal(e: std::io::Error) -> S3Error {
    S3Error::InternalError(e.to_string())
}

/// PUT object handler with copy and upload-part detection
/// PUT /{bucket}/{key}                           -> PutObject
/// PUT /{bucket}/{key}?partNumber=N&uploadId=X   -> UploadPart
/// PUT /{bucket}/{key} + x-amz-copy-source       -> CopyObject
#[instrument(skip(state, headers, body))]
pub async fn put_object_or_copy(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, S3Error> {
    // UploadPart
    if let (Some(part_number), Some(upload_id)) = (query.part_number, &query.upload_id) {
        info!(
            "UploadPart {}/{} part={} uploadId={}",
            bucket, key, part_number, upload_id
        );
        let expected_md5 = content_md5_hex(&headers)?;
        let part = state
            .engine
            .upload_part(
                upload_id,
                &bucket,
                &key,
                part_number,
                body_stream(body),
                expected_md5,
            )
            .await?;
        return Ok((StatusCode::OK, [("ETag", part.quoted_etag())], "").into_response());
    }

    // CopyObject
    if headers.contains_key("x-amz-copy-source") {
        return copy_object_inner(&state, &bucket, &key, &headers).await;
    }

    // PutObject
    info!("PUT {}/{}", bucket, key);

    let content_type = extract_content_type(&headers);
    if let Some(pin) = &query.content_type_pin {
        if *pin != content_type {
            return Err(S3Error::InvalidArgument(format!(
                "Content-Type must be {pin}"
            )));
        }
    }

    let expected_md5 = content_md5_hex(&headers)?;
    let limits = state.engine.put_limits(query.max_content_length);
    let object = state
        .engine
        .put_object(
            &bucket,
            &key,
            content_type,
            body_stream(body),
            content_length(&headers),
            expected_md5,
            limits,
        )
        .await?;

    Ok((StatusCode::OK, [("ETag", object.quoted_etag())], "").into_response())
}

/// COPY object handler (internal), triggered by x-amz-copy-source.
/// Source format: `[/]bucket/key`, percent-encoded.
async fn copy_object_inner(
    state: &Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let copy_source = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            S3Error::MissingRequiredParameter("x-amz-copy-source".to_string())
        })?;

    let copy_source = urlencoding::decode(copy_source)
        .map_err(|_| S3Error::InvalidArgument("Invalid copy source encoding".to_string()))?;
    let copy_source = copy_source.trim_start_matches('/');

    let (source_bucket, source_key) = copy_source
        .split_once('/')
        .ok_or_else(|| S3Error::InvalidArgument("Copy source must be bucket/key".to_string()))?;

    validate_bucket_name(source_bucket)
        .map_err(|e| S3Error::InvalidBucketName(e.to_string()))?;
    validate_object_key(source_key)
        .map_err(|e| S3Error::InvalidArgument(e.to_string()))?;

    info!("COPY {}/{} -> {}/{}", source_bucket, source_key, bucket, key);

    let object = state
        .engine
        .copy_object(source_bucket, source_key, bucket, key)
        .await?;

    let xml = CopyObjectResult {
        etag: object.etag,
        last_modified: object.last_modified,
    }
    .to_xml();
    Ok(xml_response(xml))
}

/// GET object handler
/// GET /{bucket}/{key}             -> GetObject (Range honored)
/// GET /{bucket}/{key}?uploadId=X  -> ListParts
#[instrument(skip(state, headers))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, S3Error> {
    // ListParts
    if let Some(upload_id) = &query.upload_id {
        info!("ListParts {}/{} uploadId={}", bucket, key, upload_id);
        let (upload, parts) = state.engine.list_parts(upload_id, &bucket, &key).await?;
        let result = ListPartsResult {
            bucket,
            key,
            upload_id: upload.upload_id,
            parts: parts
                .into_iter()
                .map(|p| PartInfo {
                    part_number: p.part_number,
                    etag: p.etag,
                    size: p.size,
                    last_modified: p.modified_at,
                })
                .collect(),
            max_parts: 1000,
            is_truncated: false,
        };
        return Ok(xml_response(result.to_xml()));
    }

    info!("GET {}/{}", bucket, key);

    let (meta, mut reader) = state.engine.get_object(&bucket, &key).await?;

    if let Some(range_header) = headers.get("range").and_then(|v| v.to_str().ok()) {
        match resolve_range(range_header, meta.size) {
            Err(Unsatisfiable) => {
                return Err(S3Error::InvalidRange(format!("/{bucket}/{key}")));
            }
            Ok(Some((start, end))) => {
                reader
                    .seek(SeekFrom::Start(start))
                    .await
                    .map_err(io_internal)?;
                let len = end - start + 1;

                let mut response_headers = build_object_headers(&meta);
                let mut itoa_buf = itoa::Buffer::new();
                response_headers.insert("Content-Length", hval(itoa_buf.format(len)));
                response_headers.insert(
                    "Content-Range",
                    hval(&format!("bytes {start}-{end}/{}", meta.size)),
                );

                let stream = ReaderStream::new(reader.take(len));
                return Ok((
                    StatusCode::PARTIAL_CONTENT,
                    response_headers,
                    Body::from_stream(stream),
                )
                    .into_response());
            }
            Ok(None) => {}
        }
    }

    let stream = ReaderStream::new(reader);
    Ok((
        StatusCode::OK,
        build_object_headers(&meta),
        Body::from_stream(stream),
    )
        .into_response())
}

/// HEAD object handler
/// HEAD /{bucket}/{key}
#[instrument(skip(state))]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
) -> Result<Response, S3Error> {
    info!("HEAD {}/{}", bucket, key);

    let meta = state.engine.head_object(&bucket, &key).await?;
    Ok((StatusCode::OK, build_object_headers(&meta)).into_response())
}

/// DELETE object handler
/// DELETE /{bucket}/{key}             -> DeleteObject (204 even if missing)
/// DELETE /{bucket}/{key}?uploadId=X  -> AbortMultipartUpload
#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath { bucket, key }: ValidatedPath,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    if let Some(upload_id) = &query.upload_id {
        info!(
            "AbortMultipartUpload {}/{} uploadId={}",
            bucket, key, upload_id
        );
        state.engine.abort_upload(upload_id, &bucket, &key).await?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    info!("DELETE {}/{}", bucket, key);

    state.engine.delete_object(&bucket, &key).await?;

    // S3 returns 204 No Content whether or not the object existed
    Ok(StatusCode::NO_CONTENT.into_response())
}
