//! Bucket-level S3 handlers: CREATE, DELETE, HEAD, LIST, ListObjects v1/v2,
//! and GetBucketLocation.

use super::{xml_response, AppState, S3Error};
use crate::api::extractors::ValidatedBucket;
use crate::api::xml::{BucketInfo, ListBucketResult, ListBucketsResult, S3Object};
use crate::meta::ListObjectsQuery;
use crate::types::validate_bucket_name;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, instrument};

/// Query parameters for bucket-level GET operations
#[derive(Debug, serde::Deserialize, Default)]
pub struct BucketGetQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<u8>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<u32>,
    /// v2 pagination
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
    /// v1 pagination
    pub marker: Option<String>,
    /// Encoding type for keys/prefixes in the response (e.g. "url")
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
    /// GetBucketLocation query parameter
    pub location: Option<String>,
}

/// Bucket-level GET handler — dispatches on query params.
/// GET /{bucket}?list-type=2&prefix=  -> ListObjectsV2
/// GET /{bucket}?location             -> GetBucketLocation
/// GET /{bucket}                      -> ListObjects (v1)
#[instrument(skip(state))]
pub async fn bucket_get_handler(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
    Query(query): Query<BucketGetQuery>,
) -> Result<Response, S3Error> {
    if query.location.is_some() {
        info!("GET bucket location: {}", bucket);
        return get_bucket_location(&state, &bucket).await;
    }

    let is_v2 = query.list_type == Some(2);
    let prefix = query.prefix.unwrap_or_default();
    let delimiter = query.delimiter.clone().filter(|d| !d.is_empty());
    let max_keys = query.max_keys.unwrap_or(1000);

    // v1 uses `marker`; v2 uses `continuation-token` with `start-after` as
    // the initial-page variant. All mean "keys strictly greater than".
    let marker = if is_v2 {
        query
            .continuation_token
            .clone()
            .or_else(|| query.start_after.clone())
    } else {
        query.marker.clone()
    };

    info!(
        "LIST {}/{}* (v{})",
        bucket,
        prefix,
        if is_v2 { "2" } else { "1" }
    );

    let page = state
        .engine
        .list_objects(
            &bucket,
            &ListObjectsQuery {
                prefix: prefix.clone(),
                delimiter: delimiter.clone(),
                marker,
                max_keys,
            },
        )
        .await?;

    let contents: Vec<S3Object> = page
        .objects
        .into_iter()
        .map(|o| S3Object::new(o.key, o.size, o.last_modified, o.etag))
        .collect();

    let xml = if is_v2 {
        ListBucketResult::new_v2(
            bucket,
            prefix,
            delimiter,
            max_keys,
            contents,
            page.common_prefixes,
            query.continuation_token,
            page.next_marker,
            query.start_after,
            page.is_truncated,
            query.encoding_type,
        )
        .to_xml()
    } else {
        ListBucketResult::new_v1(
            bucket,
            prefix,
            delimiter,
            max_keys,
            contents,
            page.common_prefixes,
            query.marker,
            page.next_marker,
            page.is_truncated,
            query.encoding_type,
        )
        .to_xml()
    };

    Ok(xml_response(xml))
}

/// GetBucketLocation handler
/// GET /{bucket}?location
async fn get_bucket_location(state: &Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    // The bucket must exist even though the answer is constant
    state
        .engine
        .get_bucket(bucket)
        .await?
        .ok_or_else(|| S3Error::NoSuchBucket(bucket.to_string()))?;

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">{}</LocationConstraint>"#,
        crate::api::xml::escape_xml(&state.region)
    );
    Ok(xml_response(xml))
}

/// CREATE bucket handler
/// PUT /{bucket}
#[instrument(skip(state))]
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    info!("CREATE bucket {}", bucket);

    validate_bucket_name(&bucket).map_err(|e| S3Error::InvalidBucketName(e.to_string()))?;

    state.engine.create_bucket(&bucket).await?;

    Ok((StatusCode::OK, [("Location", format!("/{}", bucket))], "").into_response())
}

/// DELETE bucket handler — refuses unless the bucket is empty of both
/// objects and in-flight multipart uploads.
/// DELETE /{bucket}
#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
) -> Result<Response, S3Error> {
    info!("DELETE bucket {}", bucket);

    state.engine.delete_bucket(&bucket).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// HEAD bucket handler
/// HEAD /{bucket}
#[instrument(skip(state))]
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    ValidatedBucket(bucket): ValidatedBucket,
) -> Result<Response, S3Error> {
    info!("HEAD bucket {}", bucket);

    state
        .engine
        .get_bucket(&bucket)
        .await?
        .ok_or(S3Error::NoSuchBucket(bucket))?;

    Ok((
        StatusCode::OK,
        [("x-amz-bucket-region", state.region.clone())],
    )
        .into_response())
}

/// LIST buckets handler
/// GET /
#[instrument(skip(state))]
pub async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Response, S3Error> {
    info!("LIST buckets");

    let buckets = state.engine.list_buckets().await?;

    let result = ListBucketsResult {
        owner_id: "sss".to_string(),
        owner_display_name: "sss".to_string(),
        buckets: buckets
            .into_iter()
            .map(|b| BucketInfo {
                name: b.name,
                creation_date: b.created_at,
            })
            .collect(),
    };

    Ok(xml_response(result.to_xml()))
}
