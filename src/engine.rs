//! Object engine: orchestrates the metadata store and the blob store.
//!
//! Every S3 data operation funnels through here. The dual-store contract:
//! blobs are renamed into place first, the metadata row upsert is the commit
//! point, and a blob orphaned by a failed commit is deleted best-effort
//! (an orphan is invisible garbage, never a correctness problem).

use crate::meta::{ListObjectsQuery, MetaError, MetadataStore, ObjectPage};
use crate::storage::{BlobReader, BlobStore, BodyStream, StorageError};
use crate::types::{Bucket, MultipartUpload, ObjectMeta, PartMeta};
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Maximum part number accepted for multipart uploads (S3 limit).
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Errors from the object engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No such bucket: {0}")]
    NoSuchBucket(String),

    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Bucket already exists: {0}")]
    BucketExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    #[error("Object too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Content-MD5 mismatch")]
    BadDigest,

    #[error("Metadata error: {0}")]
    Meta(MetaError),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<MetaError> for EngineError {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::BucketExists(name) => EngineError::BucketExists(name),
            MetaError::BucketNotFound(name) => EngineError::NoSuchBucket(name),
            MetaError::BucketNotEmpty(name) => EngineError::BucketNotEmpty(name),
            other => EngineError::Meta(other),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TooLarge { size, max } => EngineError::TooLarge { size, max },
            StorageError::DigestMismatch { .. } => EngineError::BadDigest,
            StorageError::SizeMismatch { expected, actual } => EngineError::InvalidArgument(
                format!("body length mismatch: expected {expected}, got {actual}"),
            ),
            other => EngineError::Storage(other),
        }
    }
}

/// Size limits applied to a single write, resolved by the handler from
/// configuration plus any per-request presigned cap.
#[derive(Debug, Clone, Copy)]
pub struct PutLimits {
    /// Hard cap on this request's body.
    pub max_len: u64,
}

/// The object engine. Cheap to share; all state lives in the two stores.
pub struct ObjectEngine {
    meta: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    max_object_size: u64,
    max_upload_size: u64,
}

impl ObjectEngine {
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        max_object_size: u64,
        max_upload_size: u64,
    ) -> Self {
        Self {
            meta,
            blobs,
            max_object_size,
            max_upload_size,
        }
    }

    /// Resolve the effective cap for one request body: global object and
    /// upload limits plus an optional per-request (presigned) cap.
    pub fn put_limits(&self, request_cap: Option<u64>) -> PutLimits {
        let mut max_len = self.max_object_size.min(self.max_upload_size);
        if let Some(cap) = request_cap {
            max_len = max_len.min(cap);
        }
        PutLimits { max_len }
    }

    async fn require_bucket(&self, bucket: &str) -> Result<Bucket, EngineError> {
        self.meta
            .get_bucket(bucket)
            .await?
            .ok_or_else(|| EngineError::NoSuchBucket(bucket.to_string()))
    }

    /// Best-effort blob reclamation; failure logs and moves on.
    async fn reclaim_blob(&self, storage_path: &str, why: &str) {
        if let Err(e) = self.blobs.delete(storage_path).await {
            warn!("Failed to delete blob {} ({}): {}", storage_path, why, e);
        }
    }

    // === Buckets ===

    #[instrument(skip(self))]
    pub async fn create_bucket(&self, name: &str) -> Result<Bucket, EngineError> {
        let bucket = Bucket {
            name: name.to_string(),
            created_at: Utc::now(),
            is_public: false,
        };
        self.meta.create_bucket(&bucket).await?;
        info!("Created bucket {}", name);
        Ok(bucket)
    }

    pub async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, EngineError> {
        Ok(self.meta.get_bucket(name).await?)
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, EngineError> {
        Ok(self.meta.list_buckets().await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_bucket(&self, name: &str) -> Result<(), EngineError> {
        self.meta.delete_bucket(name).await?;
        info!("Deleted bucket {}", name);
        Ok(())
    }

    pub async fn set_bucket_public(
        &self,
        name: &str,
        is_public: bool,
    ) -> Result<(), EngineError> {
        self.meta.set_bucket_public(name, is_public).await?;
        info!("Bucket {} is now {}", name, if is_public { "public" } else { "private" });
        Ok(())
    }

    // === Objects ===

    /// Stream a PUT body into the blob store, then commit the object row.
    /// The row upsert is the commit point; on upsert failure the fresh blob
    /// is deleted, on success the replaced row's blob is reclaimed.
    #[instrument(skip(self, body, expected_md5))]
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: String,
        body: BodyStream,
        expected_len: Option<u64>,
        expected_md5: Option<String>,
        limits: PutLimits,
    ) -> Result<ObjectMeta, EngineError> {
        self.require_bucket(bucket).await?;

        let blob = self
            .blobs
            .put_object(bucket, key, body, expected_len, expected_md5, limits.max_len)
            .await?;

        let object = ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: blob.size,
            etag: blob.etag,
            content_type,
            last_modified: Utc::now(),
            storage_path: blob.storage_path.clone(),
        };

        match self.meta.put_object(&object).await {
            Ok(replaced) => {
                if let Some(old) = replaced {
                    if old.storage_path != object.storage_path {
                        self.reclaim_blob(&old.storage_path, "replaced by PUT").await;
                    }
                }
                debug!("PUT {}/{} committed ({} bytes)", bucket, key, object.size);
                Ok(object)
            }
            Err(e) => {
                // Roll the write back; the object never became visible
                self.reclaim_blob(&blob.storage_path, "metadata commit failed")
                    .await;
                Err(e.into())
            }
        }
    }

    /// Look up an object's row, distinguishing a missing bucket from a
    /// missing key.
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta, EngineError> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_object(bucket, key)
            .await?
            .ok_or_else(|| EngineError::NoSuchKey(format!("/{bucket}/{key}")))
    }

    /// Open an object for reading. The caller seeks for Range requests.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectMeta, BlobReader), EngineError> {
        let object = self.head_object(bucket, key).await?;
        let reader = self.blobs.open(&object.storage_path).await?;
        Ok((object, reader))
    }

    /// S3 delete semantics: succeeds whether or not the object (or even the
    /// bucket) exists. Blob deletion failure downgrades to a warning — the
    /// row is already gone, so the blob is mere garbage.
    #[instrument(skip(self))]
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), EngineError> {
        if let Some(old) = self.meta.delete_object(bucket, key).await? {
            self.reclaim_blob(&old.storage_path, "deleted object").await;
            debug!("DELETE {}/{}", bucket, key);
        }
        Ok(())
    }

    /// Server-side copy: stream the source blob into a fresh destination
    /// blob, then commit the destination row.
    #[instrument(skip(self))]
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMeta, EngineError> {
        self.require_bucket(dst_bucket).await?;
        let source = self.head_object(src_bucket, src_key).await?;

        if source.size > self.max_object_size {
            return Err(EngineError::TooLarge {
                size: source.size,
                max: self.max_object_size,
            });
        }

        let reader = self.blobs.open(&source.storage_path).await?;
        let body: BodyStream = tokio_util::io::ReaderStream::new(reader).boxed();

        let blob = self
            .blobs
            .put_object(
                dst_bucket,
                dst_key,
                body,
                Some(source.size),
                None,
                self.max_object_size,
            )
            .await?;

        let object = ObjectMeta {
            bucket: dst_bucket.to_string(),
            key: dst_key.to_string(),
            size: blob.size,
            etag: blob.etag,
            content_type: source.content_type.clone(),
            last_modified: Utc::now(),
            storage_path: blob.storage_path.clone(),
        };

        match self.meta.put_object(&object).await {
            Ok(replaced) => {
                if let Some(old) = replaced {
                    if old.storage_path != object.storage_path {
                        self.reclaim_blob(&old.storage_path, "replaced by COPY").await;
                    }
                }
                info!(
                    "COPY {}/{} -> {}/{} ({} bytes)",
                    src_bucket, src_key, dst_bucket, dst_key, object.size
                );
                Ok(object)
            }
            Err(e) => {
                self.reclaim_blob(&blob.storage_path, "metadata commit failed")
                    .await;
                Err(e.into())
            }
        }
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        query: &ListObjectsQuery,
    ) -> Result<ObjectPage, EngineError> {
        self.require_bucket(bucket).await?;
        Ok(self.meta.list_objects(bucket, query).await?)
    }

    // === Multipart uploads ===

    /// Open a new multipart upload. The upload id carries 128 bits of
    /// entropy (uuid v4, hex).
    #[instrument(skip(self))]
    pub async fn initiate_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: String,
    ) -> Result<MultipartUpload, EngineError> {
        self.require_bucket(bucket).await?;

        let upload = MultipartUpload {
            upload_id: uuid::Uuid::new_v4().simple().to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            initiated_at: Utc::now(),
            content_type,
        };
        self.meta.create_upload(&upload).await?;
        info!(
            "Initiated multipart upload {} for {}/{}",
            upload.upload_id, bucket, key
        );
        Ok(upload)
    }

    /// The upload must exist and belong to (bucket, key); a mismatch is
    /// indistinguishable from a missing upload on the wire.
    async fn require_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<MultipartUpload, EngineError> {
        let upload = self
            .meta
            .get_upload(upload_id)
            .await?
            .ok_or_else(|| EngineError::NoSuchUpload(upload_id.to_string()))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(EngineError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(upload)
    }

    #[instrument(skip(self, body, expected_md5))]
    pub async fn upload_part(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_number: u32,
        body: BodyStream,
        expected_md5: Option<String>,
    ) -> Result<PartMeta, EngineError> {
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(EngineError::InvalidArgument(format!(
                "Part number must be between 1 and {MAX_PART_NUMBER}"
            )));
        }
        self.require_upload(upload_id, bucket, key).await?;

        let stored = self
            .blobs
            .put_part(upload_id, part_number, body, expected_md5, self.max_upload_size)
            .await?;

        let part = PartMeta {
            upload_id: upload_id.to_string(),
            part_number,
            size: stored.size,
            etag: stored.etag,
            modified_at: Utc::now(),
        };
        self.meta.put_part(&part).await?;
        debug!(
            "UploadPart {} #{} ({} bytes)",
            upload_id, part_number, part.size
        );
        Ok(part)
    }

    pub async fn list_parts(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(MultipartUpload, Vec<PartMeta>), EngineError> {
        let upload = self.require_upload(upload_id, bucket, key).await?;
        let parts = self.meta.list_parts(upload_id).await?;
        Ok((upload, parts))
    }

    /// Validate the client's part list against staged parts, merge in
    /// ascending part order, and commit the final object.
    #[instrument(skip(self, requested_parts))]
    pub async fn complete_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        requested_parts: &[(u32, String)],
    ) -> Result<ObjectMeta, EngineError> {
        let upload = self.require_upload(upload_id, bucket, key).await?;

        if requested_parts.is_empty() {
            return Err(EngineError::InvalidPart(
                "You must specify at least one part".to_string(),
            ));
        }

        let stored: std::collections::HashMap<u32, PartMeta> = self
            .meta
            .list_parts(upload_id)
            .await?
            .into_iter()
            .map(|p| (p.part_number, p))
            .collect();

        let mut total_size: u64 = 0;
        let mut numbers: Vec<u32> = Vec::with_capacity(requested_parts.len());
        for (part_number, requested_etag) in requested_parts {
            let part = stored.get(part_number).ok_or_else(|| {
                EngineError::InvalidPart(format!("Part {part_number} has not been uploaded"))
            })?;
            let requested_clean = requested_etag.trim_matches('"');
            if requested_clean != part.etag {
                return Err(EngineError::InvalidPart(format!(
                    "ETag mismatch for part {part_number}"
                )));
            }
            numbers.push(*part_number);
            total_size += part.size;
        }

        // Merge order is ascending part number regardless of request order
        numbers.sort_unstable();
        numbers.dedup();

        if total_size > self.max_object_size {
            return Err(EngineError::TooLarge {
                size: total_size,
                max: self.max_object_size,
            });
        }

        let blob = self
            .blobs
            .merge_parts(bucket, key, upload_id, &numbers, self.max_object_size)
            .await?;

        let object = ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: blob.size,
            etag: blob.etag,
            content_type: upload.content_type.clone(),
            last_modified: Utc::now(),
            storage_path: blob.storage_path.clone(),
        };

        match self.meta.put_object(&object).await {
            Ok(replaced) => {
                if let Some(old) = replaced {
                    if old.storage_path != object.storage_path {
                        self.reclaim_blob(&old.storage_path, "replaced by multipart complete")
                            .await;
                    }
                }
            }
            Err(e) => {
                self.reclaim_blob(&blob.storage_path, "metadata commit failed")
                    .await;
                return Err(e.into());
            }
        }

        self.meta.delete_parts(upload_id).await?;
        self.meta.delete_upload(upload_id).await?;
        info!(
            "Completed multipart upload {} for {}/{} ({} parts, {} bytes)",
            upload_id,
            bucket,
            key,
            numbers.len(),
            object.size
        );
        Ok(object)
    }

    /// Abort an upload: drop the staging directory and all its rows.
    /// A second abort (or any later touch) sees NoSuchUpload.
    #[instrument(skip(self))]
    pub async fn abort_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<(), EngineError> {
        self.require_upload(upload_id, bucket, key).await?;
        self.blobs.abort_upload(upload_id).await?;
        self.meta.delete_parts(upload_id).await?;
        self.meta.delete_upload(upload_id).await?;
        info!("Aborted multipart upload {}", upload_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::SqliteStore;
    use crate::storage::FsBlobStore;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    fn body(data: Vec<u8>) -> BodyStream {
        stream::iter(vec![Ok(Bytes::from(data))]).boxed()
    }

    async fn engine() -> (TempDir, ObjectEngine) {
        let dir = TempDir::new().unwrap();
        let meta = Arc::new(SqliteStore::open_in_memory().unwrap());
        let blobs = Arc::new(FsBlobStore::new(dir.path().to_path_buf()).await.unwrap());
        let engine = ObjectEngine::new(meta, blobs, 64 * 1024, 64 * 1024);
        (dir, engine)
    }

    async fn read_to_vec(mut reader: BlobReader) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();

        let object = engine
            .put_object(
                "b",
                "hello.txt",
                "text/plain".into(),
                body(b"Hello, World!".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();
        assert_eq!(object.etag, "65a8e27d8879283831b664bd8b7f0ad4");
        assert_eq!(object.size, 13);

        let (meta, reader) = engine.get_object("b", "hello.txt").await.unwrap();
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(read_to_vec(reader).await, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_put_requires_bucket() {
        let (_dir, engine) = engine().await;
        let err = engine
            .put_object(
                "missing",
                "k",
                "text/plain".into(),
                body(b"x".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket(_)));
    }

    #[tokio::test]
    async fn test_put_replacement_reclaims_old_blob() {
        let (dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();

        let first = engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(b"one".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();
        let second = engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(b"two".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();
        assert_ne!(first.storage_path, second.storage_path);

        // Old blob is reclaimed once the new row is the source of truth
        assert!(!dir.path().join(&first.storage_path).exists());
        assert!(dir.path().join(&second.storage_path).exists());
    }

    #[tokio::test]
    async fn test_bad_digest_rolls_back() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();

        engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(b"original".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();

        let err = engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(b"tampered".to_vec()),
                None,
                Some("00000000000000000000000000000000".to_string()),
                engine.put_limits(None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadDigest));

        // The failed write never disturbed the committed object
        let (_, reader) = engine.get_object("b", "k").await.unwrap();
        assert_eq!(read_to_vec(reader).await, b"original");
    }

    #[tokio::test]
    async fn test_request_cap_applies() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();

        let err = engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(vec![0u8; 100]),
                None,
                None,
                engine.put_limits(Some(10)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TooLarge { .. }));
        assert!(matches!(
            engine.head_object("b", "k").await.unwrap_err(),
            EngineError::NoSuchKey(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_tolerant() {
        let (_dir, engine) = engine().await;
        // Missing bucket, missing key: both fine
        engine.delete_object("ghost", "k").await.unwrap();

        engine.create_bucket("b").await.unwrap();
        engine
            .put_object(
                "b",
                "k",
                "text/plain".into(),
                body(b"x".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();
        engine.delete_object("b", "k").await.unwrap();
        assert!(matches!(
            engine.head_object("b", "k").await.unwrap_err(),
            EngineError::NoSuchKey(_)
        ));
        engine.delete_object("b", "k").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_object() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("src").await.unwrap();
        engine.create_bucket("dst").await.unwrap();

        let source = engine
            .put_object(
                "src",
                "a",
                "application/json".into(),
                body(b"{\"v\":1}".to_vec()),
                None,
                None,
                engine.put_limits(None),
            )
            .await
            .unwrap();

        let copied = engine.copy_object("src", "a", "dst", "b").await.unwrap();
        assert_eq!(copied.etag, source.etag);
        assert_eq!(copied.content_type, "application/json");

        let (_, reader) = engine.get_object("dst", "b").await.unwrap();
        assert_eq!(read_to_vec(reader).await, b"{\"v\":1}");

        let err = engine
            .copy_object("src", "missing", "dst", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchKey(_)));
    }

    #[tokio::test]
    async fn test_multipart_roundtrip() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();

        let upload = engine
            .initiate_upload("b", "big", "application/octet-stream".into())
            .await
            .unwrap();
        assert!(upload.upload_id.len() >= 32);

        let p1 = engine
            .upload_part(&upload.upload_id, "b", "big", 1, body(vec![0x41; 1000]), None)
            .await
            .unwrap();
        let p2 = engine
            .upload_part(&upload.upload_id, "b", "big", 2, body(vec![0x42]), None)
            .await
            .unwrap();

        // Complete in reverse request order: merge still sorts ascending
        let object = engine
            .complete_upload(
                &upload.upload_id,
                "b",
                "big",
                &[
                    (2, p2.quoted_etag()),
                    (1, p1.quoted_etag()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(object.size, 1001);
        assert!(object.etag.ends_with("-2"));
        assert_eq!(object.content_type, "application/octet-stream");

        let (_, reader) = engine.get_object("b", "big").await.unwrap();
        let data = read_to_vec(reader).await;
        assert_eq!(data.len(), 1001);
        assert!(data[..1000].iter().all(|&b| b == 0x41));
        assert_eq!(data[1000], 0x42);

        // The upload is gone after completion
        let err = engine
            .list_parts(&upload.upload_id, "b", "big")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn test_complete_rejects_bad_parts() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let upload = engine
            .initiate_upload("b", "k", "application/octet-stream".into())
            .await
            .unwrap();
        let p1 = engine
            .upload_part(&upload.upload_id, "b", "k", 1, body(b"data".to_vec()), None)
            .await
            .unwrap();

        // Unknown part number
        let err = engine
            .complete_upload(&upload.upload_id, "b", "k", &[(2, p1.quoted_etag())])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPart(_)));

        // Wrong etag
        let err = engine
            .complete_upload(
                &upload.upload_id,
                "b",
                "k",
                &[(1, "\"00000000000000000000000000000000\"".to_string())],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPart(_)));

        // Empty part list
        let err = engine
            .complete_upload(&upload.upload_id, "b", "k", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPart(_)));

        // The upload survives failed completion attempts
        let (_, parts) = engine.list_parts(&upload.upload_id, "b", "k").await.unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[tokio::test]
    async fn test_part_number_bounds() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let upload = engine
            .initiate_upload("b", "k", "application/octet-stream".into())
            .await
            .unwrap();

        for n in [0, MAX_PART_NUMBER + 1] {
            let err = engine
                .upload_part(&upload.upload_id, "b", "k", n, body(b"x".to_vec()), None)
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidArgument(_)), "n={n}");
        }
    }

    #[tokio::test]
    async fn test_abort_upload() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let upload = engine
            .initiate_upload("b", "k", "application/octet-stream".into())
            .await
            .unwrap();
        engine
            .upload_part(&upload.upload_id, "b", "k", 1, body(b"x".to_vec()), None)
            .await
            .unwrap();

        engine.abort_upload(&upload.upload_id, "b", "k").await.unwrap();

        // Subsequent abort and uploads see NoSuchUpload
        let err = engine
            .abort_upload(&upload.upload_id, "b", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchUpload(_)));
        let err = engine
            .upload_part(&upload.upload_id, "b", "k", 2, body(b"y".to_vec()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn test_upload_bucket_key_mismatch() {
        let (_dir, engine) = engine().await;
        engine.create_bucket("b").await.unwrap();
        let upload = engine
            .initiate_upload("b", "k", "application/octet-stream".into())
            .await
            .unwrap();

        let err = engine
            .upload_part(&upload.upload_id, "b", "other-key", 1, body(b"x".to_vec()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn test_list_objects_requires_bucket() {
        let (_dir, engine) = engine().await;
        let err = engine
            .list_objects(
                "ghost",
                &ListObjectsQuery {
                    max_keys: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchBucket(_)));
    }
}
