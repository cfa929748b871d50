//! Metadata store: the authoritative index of buckets, objects, multipart
//! uploads, parts, API keys and permissions.
//!
//! The object row is the single source of truth for existence — a blob with
//! no row is garbage, never visible. All mutations that need atomicity
//! (bucket delete-if-empty, object upsert) happen inside one store call.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::types::{ApiKey, ApiKeyPermission, Bucket, MultipartUpload, ObjectMeta, PartMeta};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from metadata store operations
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("API key not found: {0}")]
    KeyNotFound(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Metadata store error: {0}")]
    Other(String),
}

/// Parameters for a ListObjects call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsQuery {
    pub prefix: String,
    /// Delimiter for CommonPrefixes grouping; `None` or empty means no grouping.
    pub delimiter: Option<String>,
    /// Keys strictly greater than this value are returned (v1 marker,
    /// v2 continuation-token / start-after).
    pub marker: Option<String>,
    pub max_keys: u32,
}

/// One page of a ListObjects result.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Last key or CommonPrefix emitted; clients resume from here.
    pub next_marker: Option<String>,
}

/// Everything the credential registry needs for one atomic snapshot reload.
#[derive(Debug, Clone, Default)]
pub struct CredentialDump {
    pub keys: Vec<ApiKey>,
    pub permissions: Vec<ApiKeyPermission>,
}

/// Transactional metadata store. The SQLite implementation serializes all
/// calls through a single connection; implementations must keep each method
/// atomic with respect to concurrent callers.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // === Buckets ===

    /// Create a bucket. Fails with `BucketExists` on a duplicate name
    /// (enforced by the primary key, so concurrent creates race safely).
    async fn create_bucket(&self, bucket: &Bucket) -> Result<(), MetaError>;

    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, MetaError>;

    async fn list_buckets(&self) -> Result<Vec<Bucket>, MetaError>;

    /// Delete a bucket iff it holds zero objects and zero in-flight multipart
    /// uploads. The emptiness check and the delete happen in one transaction.
    async fn delete_bucket(&self, name: &str) -> Result<(), MetaError>;

    async fn set_bucket_public(&self, name: &str, is_public: bool) -> Result<(), MetaError>;

    // === Objects ===

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, MetaError>;

    /// Upsert an object row, returning the row it replaced (if any) so the
    /// caller can reclaim the prior blob. Replacing an existing key is
    /// atomic — readers observe either the old or the new row, never a
    /// partial one.
    async fn put_object(&self, object: &ObjectMeta) -> Result<Option<ObjectMeta>, MetaError>;

    /// Delete an object row; returns the row that was removed, if any.
    async fn delete_object(&self, bucket: &str, key: &str)
        -> Result<Option<ObjectMeta>, MetaError>;

    async fn list_objects(
        &self,
        bucket: &str,
        query: &ListObjectsQuery,
    ) -> Result<ObjectPage, MetaError>;

    // === Multipart uploads ===

    async fn create_upload(&self, upload: &MultipartUpload) -> Result<(), MetaError>;

    async fn get_upload(&self, upload_id: &str) -> Result<Option<MultipartUpload>, MetaError>;

    async fn delete_upload(&self, upload_id: &str) -> Result<(), MetaError>;

    /// Upsert a part row (re-uploading a part number replaces it).
    async fn put_part(&self, part: &PartMeta) -> Result<(), MetaError>;

    /// All parts of an upload, ascending by part number.
    async fn list_parts(&self, upload_id: &str) -> Result<Vec<PartMeta>, MetaError>;

    async fn delete_parts(&self, upload_id: &str) -> Result<(), MetaError>;

    // === API keys and permissions ===

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), MetaError>;

    async fn get_api_key(&self, access_key_id: &str) -> Result<Option<ApiKey>, MetaError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, MetaError>;

    async fn update_api_key_description(
        &self,
        access_key_id: &str,
        description: &str,
    ) -> Result<(), MetaError>;

    async fn set_api_key_enabled(
        &self,
        access_key_id: &str,
        enabled: bool,
    ) -> Result<(), MetaError>;

    async fn set_api_key_secret(&self, access_key_id: &str, secret: &str)
        -> Result<(), MetaError>;

    /// Delete a key and all its permissions.
    async fn delete_api_key(&self, access_key_id: &str) -> Result<(), MetaError>;

    async fn put_permission(&self, permission: &ApiKeyPermission) -> Result<(), MetaError>;

    async fn delete_permission(&self, access_key_id: &str, bucket: &str)
        -> Result<(), MetaError>;

    async fn list_permissions(&self, access_key_id: &str)
        -> Result<Vec<ApiKeyPermission>, MetaError>;

    /// One consistent snapshot of every key and every permission, for the
    /// credential registry's reload.
    async fn dump_credentials(&self) -> Result<CredentialDump, MetaError>;
}
