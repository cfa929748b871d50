//! SSS - S3-compatible single-node object storage server

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::{extract::DefaultBodyLimit, Router};
use clap::Parser;
use sss::api::admin;
use sss::api::authz::s3_auth_middleware;
use sss::api::handlers::{
    bucket_get_handler, create_bucket, delete_bucket, delete_object, get_object, head_bucket,
    head_object, head_root, health_check, list_buckets, method_not_allowed, post_object,
    put_object_or_copy, AppState,
};
use sss::config::Config;
use sss::creds::CredentialRegistry;
use sss::engine::ObjectEngine;
use sss::meta::{MetadataStore, SqliteStore};
use sss::storage::{BlobStore, FsBlobStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Version string including build timestamp for --version output
fn version_long() -> &'static str {
    // e.g. "0.3.0 (built 2026-02-23T21:40:07Z)"
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| {
        format!(
            "{} (built {})",
            env!("CARGO_PKG_VERSION"),
            env!("SSS_BUILD_TIME"),
        )
    })
}

/// SSS — S3-compatible single-node object storage server
#[derive(Parser, Debug)]
#[command(name = "sss")]
#[command(version = version_long())]
#[command(author, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Priority: RUST_LOG > SSS_LOG_LEVEL > --verbose > default
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("SSS_LOG_LEVEL").map(EnvFilter::new))
        .unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("sss=trace,tower_http=trace")
            } else {
                EnvFilter::new("sss=info,tower_http=info")
            }
        });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }

    let admin_identity = config.admin_identity().ok_or(
        "admin credentials not configured — set SSS_ADMIN_ACCESS_KEY_ID and \
         SSS_ADMIN_SECRET_ACCESS_KEY (or the matching config keys)",
    )?;

    info!(
        "Starting SSS v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("SSS_BUILD_TIME"),
    );
    info!("  Listen address: {}", config.listen_addr);
    info!("  Data directory: {:?}", config.data_dir);
    info!("  Database: {:?}", config.db_path());
    info!("  Region: {}", config.region);
    info!(
        "  Max object size: {} MB",
        config.max_object_size / 1024 / 1024
    );
    info!(
        "  Max upload size: {} MB",
        config.max_upload_size / 1024 / 1024
    );
    info!("  Admin access key: {}", admin_identity.access_key_id);

    // Stores
    let meta: Arc<dyn MetadataStore> = Arc::new(SqliteStore::open(&config.db_path())?);
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.data_dir.clone()).await?);

    // Credential registry: load the initial snapshot before serving
    let creds = Arc::new(CredentialRegistry::new(meta.clone(), admin_identity));
    creds.reload().await?;

    let engine = Arc::new(ObjectEngine::new(
        meta.clone(),
        blobs,
        config.max_object_size,
        config.max_upload_size,
    ));

    let state = Arc::new(AppState {
        engine,
        meta,
        creds,
        region: config.region.clone(),
    });

    // Build router with S3 path-style conventions:
    //   GET    /                      - list buckets
    //   PUT    /{bucket}              - create bucket
    //   DELETE /{bucket}              - delete bucket
    //   HEAD   /{bucket}              - head bucket
    //   GET    /{bucket}              - list objects (v2 with list-type=2)
    //   PUT    /{bucket}/{key...}     - put object / copy / upload part
    //   GET    /{bucket}/{key...}     - get object / list parts
    //   HEAD   /{bucket}/{key...}     - head object
    //   DELETE /{bucket}/{key...}     - delete object / abort upload
    //   POST   /{bucket}/{key...}     - initiate / complete multipart upload
    // plus the JSON admin surface under /api/admin.
    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/",
            get(list_buckets)
                .head(head_root)
                .fallback(method_not_allowed),
        )
        // Admin API (static segments win over the bucket captures below)
        .route(
            "/api/admin/keys",
            get(admin::list_keys)
                .post(admin::create_key)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/admin/keys/:id",
            put(admin::update_key)
                .delete(admin::delete_key)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/admin/keys/:id/secret",
            post(admin::reset_secret).fallback(method_not_allowed),
        )
        .route(
            "/api/admin/keys/:id/permissions",
            get(admin::list_permissions)
                .put(admin::put_permission)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/admin/keys/:id/permissions/:bucket",
            delete(admin::delete_permission).fallback(method_not_allowed),
        )
        .route(
            "/api/admin/buckets/:bucket/public",
            put(admin::set_bucket_public).fallback(method_not_allowed),
        )
        // Object operations (wildcard routes first - more specific)
        .route(
            "/:bucket/*key",
            get(get_object)
                .put(put_object_or_copy)
                .delete(delete_object)
                .head(head_object)
                .post(post_object)
                .fallback(method_not_allowed),
        )
        // Bucket operations (with and without trailing slash)
        .route(
            "/:bucket",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .fallback(method_not_allowed),
        )
        .route(
            "/:bucket/",
            get(bucket_get_handler)
                .put(create_bucket)
                .delete(delete_bucket)
                .head(head_bucket)
                .fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        // SigV4 verification + permission evaluation
        .layer(middleware::from_fn_with_state(
            state.clone(),
            s3_auth_middleware,
        ))
        // Server identification + request id on every response, errors included
        .layer(middleware::from_fn(server_headers_middleware))
        // Buffered extractors (multipart complete bodies) stay bounded;
        // streamed PUT bodies are bounded by the blob store itself
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        // CORS must be outermost to handle OPTIONS preflight before auth
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("SSS listening on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Stamp `Server: SSS` and a fresh `x-amz-request-id` onto every response.
async fn server_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("Server", HeaderValue::from_static("SSS"));
    if let Ok(id) = HeaderValue::from_str(uuid::Uuid::new_v4().simple().to_string().as_str()) {
        headers.insert("x-amz-request-id", id);
    }
    response
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
