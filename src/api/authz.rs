//! Request authorization middleware.
//!
//! Every request is classified as READ (GET, HEAD) or WRITE (PUT, POST,
//! DELETE) against the bucket named by the first path segment, then:
//!
//! 1. a READ on a public bucket passes without authentication;
//! 2. everything else needs a verified SigV4 signature;
//! 3. the admin identity passes unconditionally;
//! 4. anyone else needs a matching grant in the credential registry.
//!
//! `/api/admin/*` is the management surface and always requires the admin
//! identity. The segment `api` is therefore reserved and not usable as a
//! bucket name prefix for the admin path shape.

use super::auth;
use super::errors::S3Error;
use super::handlers::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// The caller's identity, inserted into request extensions for handlers.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Unauthenticated read on a public bucket.
    Anonymous,
    /// A SigV4-verified access key.
    Key {
        access_key_id: String,
        is_admin: bool,
    },
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Key { is_admin: true, .. })
    }
}

/// Operation classification: mutating methods count as writes.
fn is_write(method: &Method) -> bool {
    matches!(*method, Method::PUT | Method::POST | Method::DELETE)
}

/// First path segment = bucket name under path-style addressing.
fn first_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Axum middleware enforcing the auth flow above.
pub async fn s3_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // CORS preflight carries no credentials by design
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();

    // Unauthenticated probes: health checks and the HEAD / reachability
    // check S3 clients send before real requests
    if path == "/health" || (request.method() == Method::HEAD && path == "/") {
        return Ok(next.run(request).await);
    }

    let write = is_write(request.method());
    let admin_api = path == "/api/admin" || path.starts_with("/api/admin/");

    // Public buckets are readable without credentials
    if !admin_api && !write {
        if let Some(bucket) = first_segment(&path) {
            if let Ok(Some(found)) = state.meta.get_bucket(bucket).await {
                if found.is_public {
                    debug!("anonymous read on public bucket {}", bucket);
                    request.extensions_mut().insert(Identity::Anonymous);
                    return Ok(next.run(request).await);
                }
            }
        }
    }

    let method = request.method().as_str().to_string();
    let verified = auth::verify(
        &method,
        request.uri(),
        request.headers(),
        state.creds.as_ref(),
        Utc::now(),
    )
    .map_err(|e| S3Error::from(e).into_response())?;

    let is_admin = state.creds.is_admin(&verified.access_key_id);

    if admin_api {
        if !is_admin {
            return Err(S3Error::AccessDenied.into_response());
        }
    } else if !is_admin {
        // ListBuckets has no bucket segment; any verified identity may call it
        if let Some(bucket) = first_segment(&path) {
            if !state.creds.can(&verified.access_key_id, bucket, write) {
                debug!(
                    "denied {} access to {} for {}",
                    if write { "write" } else { "read" },
                    bucket,
                    verified.access_key_id
                );
                return Err(S3Error::AccessDenied.into_response());
            }
        }
    }

    request.extensions_mut().insert(Identity::Key {
        access_key_id: verified.access_key_id,
        is_admin,
    });
    Ok(next.run(request).await)
}
