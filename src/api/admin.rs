//! Admin API handlers: API-key and permission management, bucket
//! public-read toggling.
//!
//! These are JSON endpoints under `/api/admin`, reachable only with a
//! SigV4-signed request from the admin identity (enforced by the authz
//! middleware). Every mutation reloads the credential registry so the
//! in-memory snapshot tracks the store.

use super::handlers::AppState;
use crate::types::{validate_bucket_name, ApiKey, ApiKeyPermission};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Access key ids are `sss-` plus 16 random characters (20 total).
const KEY_ID_RANDOM_LEN: usize = 16;
/// Secrets are 40 random characters.
const SECRET_LEN: usize = 40;

/// Admin API error: JSON body, explicit status.
#[derive(Debug)]
pub struct AdminError(StatusCode, String);

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<crate::meta::MetaError> for AdminError {
    fn from(err: crate::meta::MetaError) -> Self {
        use crate::meta::MetaError;
        match err {
            MetaError::KeyNotFound(id) => {
                AdminError(StatusCode::NOT_FOUND, format!("unknown API key {id}"))
            }
            MetaError::BucketNotFound(name) => {
                AdminError(StatusCode::NOT_FOUND, format!("unknown bucket {name}"))
            }
            other => AdminError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<crate::engine::EngineError> for AdminError {
    fn from(err: crate::engine::EngineError) -> Self {
        use crate::engine::EngineError;
        match err {
            EngineError::NoSuchBucket(name) => {
                AdminError(StatusCode::NOT_FOUND, format!("unknown bucket {name}"))
            }
            other => AdminError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Key representation with the secret redacted.
#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub access_key_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

impl From<ApiKey> for KeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            access_key_id: key.access_key_id,
            description: key.description,
            created_at: key.created_at,
            enabled: key.enabled,
        }
    }
}

/// Key representation returned exactly once, at creation or secret reset.
#[derive(Debug, Serialize)]
pub struct KeyWithSecret {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PutPermissionRequest {
    pub bucket: String,
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetPublicRequest {
    pub is_public: bool,
}

/// GET /api/admin/keys — list keys, secrets redacted.
#[instrument(skip(state))]
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<KeySummary>>, AdminError> {
    let keys = state.meta.list_api_keys().await?;
    Ok(Json(keys.into_iter().map(KeySummary::from).collect()))
}

/// POST /api/admin/keys — create a key; the secret appears only in this
/// response.
#[instrument(skip(state, body))]
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<KeyWithSecret>), AdminError> {
    let key = ApiKey {
        access_key_id: format!("sss-{}", random_string(KEY_ID_RANDOM_LEN)),
        secret: random_string(SECRET_LEN),
        description: body.description,
        created_at: Utc::now(),
        enabled: true,
    };
    state.meta.create_api_key(&key).await?;
    reload_creds(&state).await?;
    info!("Created API key {}", key.access_key_id);

    Ok((
        StatusCode::CREATED,
        Json(KeyWithSecret {
            access_key_id: key.access_key_id,
            secret_access_key: key.secret,
            description: key.description,
            created_at: key.created_at,
            enabled: key.enabled,
        }),
    ))
}

/// PUT /api/admin/keys/{id} — update description and/or enabled flag.
#[instrument(skip(state, body))]
pub async fn update_key(
    State(state): State<Arc<AppState>>,
    Path(access_key_id): Path<String>,
    Json(body): Json<UpdateKeyRequest>,
) -> Result<Json<KeySummary>, AdminError> {
    if let Some(description) = &body.description {
        state
            .meta
            .update_api_key_description(&access_key_id, description)
            .await?;
    }
    if let Some(enabled) = body.enabled {
        state
            .meta
            .set_api_key_enabled(&access_key_id, enabled)
            .await?;
        info!(
            "API key {} {}",
            access_key_id,
            if enabled { "enabled" } else { "disabled" }
        );
    }
    reload_creds(&state).await?;

    let key = state
        .meta
        .get_api_key(&access_key_id)
        .await?
        .ok_or_else(|| AdminError(StatusCode::NOT_FOUND, "unknown API key".to_string()))?;
    Ok(Json(KeySummary::from(key)))
}

/// DELETE /api/admin/keys/{id}
#[instrument(skip(state))]
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(access_key_id): Path<String>,
) -> Result<StatusCode, AdminError> {
    state.meta.delete_api_key(&access_key_id).await?;
    reload_creds(&state).await?;
    info!("Deleted API key {}", access_key_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/keys/{id}/secret — rotate the secret; the new value
/// appears only in this response.
#[instrument(skip(state))]
pub async fn reset_secret(
    State(state): State<Arc<AppState>>,
    Path(access_key_id): Path<String>,
) -> Result<Json<KeyWithSecret>, AdminError> {
    let secret = random_string(SECRET_LEN);
    state
        .meta
        .set_api_key_secret(&access_key_id, &secret)
        .await?;
    reload_creds(&state).await?;
    info!("Reset secret for API key {}", access_key_id);

    let key = state
        .meta
        .get_api_key(&access_key_id)
        .await?
        .ok_or_else(|| AdminError(StatusCode::NOT_FOUND, "unknown API key".to_string()))?;
    Ok(Json(KeyWithSecret {
        access_key_id: key.access_key_id,
        secret_access_key: secret,
        description: key.description,
        created_at: key.created_at,
        enabled: key.enabled,
    }))
}

/// GET /api/admin/keys/{id}/permissions
#[instrument(skip(state))]
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    Path(access_key_id): Path<String>,
) -> Result<Json<Vec<ApiKeyPermission>>, AdminError> {
    // 404 for unknown keys rather than an empty list
    state
        .meta
        .get_api_key(&access_key_id)
        .await?
        .ok_or_else(|| AdminError(StatusCode::NOT_FOUND, "unknown API key".to_string()))?;
    Ok(Json(state.meta.list_permissions(&access_key_id).await?))
}

/// PUT /api/admin/keys/{id}/permissions — set (or replace) one grant.
/// `bucket` is a literal bucket name or the wildcard `*`.
#[instrument(skip(state, body))]
pub async fn put_permission(
    State(state): State<Arc<AppState>>,
    Path(access_key_id): Path<String>,
    Json(body): Json<PutPermissionRequest>,
) -> Result<StatusCode, AdminError> {
    if body.bucket != "*" {
        validate_bucket_name(&body.bucket)
            .map_err(|e| AdminError(StatusCode::BAD_REQUEST, e.to_string()))?;
    }
    state
        .meta
        .get_api_key(&access_key_id)
        .await?
        .ok_or_else(|| AdminError(StatusCode::NOT_FOUND, "unknown API key".to_string()))?;

    state
        .meta
        .put_permission(&ApiKeyPermission {
            access_key_id: access_key_id.clone(),
            bucket: body.bucket.clone(),
            can_read: body.can_read,
            can_write: body.can_write,
        })
        .await?;
    reload_creds(&state).await?;
    info!(
        "Set permission for {} on {} (read={}, write={})",
        access_key_id, body.bucket, body.can_read, body.can_write
    );
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/keys/{id}/permissions/{bucket}
#[instrument(skip(state))]
pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    Path((access_key_id, bucket)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    state.meta.delete_permission(&access_key_id, &bucket).await?;
    reload_creds(&state).await?;
    info!("Removed permission for {} on {}", access_key_id, bucket);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/buckets/{bucket}/public — toggle anonymous read.
#[instrument(skip(state, body))]
pub async fn set_bucket_public(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Json(body): Json<SetPublicRequest>,
) -> Result<StatusCode, AdminError> {
    state
        .engine
        .set_bucket_public(&bucket, body.is_public)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_creds(state: &Arc<AppState>) -> Result<(), AdminError> {
    state.creds.reload().await?;
    Ok(())
}
