//! Blob store trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

/// A streaming request body: chunks arrive as the client sends them.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Readable, seekable handle onto a stored blob.
pub trait BlobRead: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> BlobRead for T {}

pub type BlobReader = Box<dyn BlobRead>;

/// Errors that can occur during blob storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Object too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Body length mismatch: expected {expected} bytes, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Content digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Unsafe storage path: {0}")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Other(String),
}

/// A blob committed to the store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Opaque handle; valid until explicitly deleted. The metadata store
    /// persists this verbatim. Every write gets a fresh handle, so replacing
    /// an object leaves the prior blob intact until its row is gone.
    pub storage_path: String,
    /// Lowercase hex MD5 (multipart merges carry the `...-N` form).
    pub etag: String,
    pub size: u64,
}

/// A staged multipart part.
#[derive(Debug, Clone)]
pub struct StoredPart {
    pub etag: String,
    pub size: u64,
}

/// Filesystem-shaped backend for object bodies and multipart part staging.
///
/// Callers validate bucket names and object keys before they get here; the
/// store still refuses any handle that would escape its root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `body` into a temporary file, computing MD5 on the fly, then
    /// atomically rename into the final location. The temp file is removed
    /// on any failure. Fails with `TooLarge` once more than `max_len` bytes
    /// arrive, with `SizeMismatch` if `expected_len` is set and differs from
    /// the byte count actually written, and with `DigestMismatch` if
    /// `expected_md5` (lowercase hex) is set and differs from the computed
    /// MD5 — all checked before the rename, so a failed write never
    /// disturbs committed data.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        expected_len: Option<u64>,
        expected_md5: Option<String>,
        max_len: u64,
    ) -> Result<StoredBlob, StorageError>;

    /// Open a committed blob for reading and seeking.
    async fn open(&self, storage_path: &str) -> Result<BlobReader, StorageError>;

    /// Delete a committed blob. Deleting a missing blob is not an error.
    async fn delete(&self, storage_path: &str) -> Result<(), StorageError>;

    /// Stream one part into the upload's staging directory at a path
    /// deterministic in `part_number`. Re-uploading a part number replaces
    /// the staged file atomically. `expected_md5` behaves as in
    /// [`BlobStore::put_object`].
    async fn put_part(
        &self,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
        expected_md5: Option<String>,
        max_len: u64,
    ) -> Result<StoredPart, StorageError>;

    /// Concatenate staged parts, in the given order, into the final object
    /// location. The merged ETag is `hex(md5(concat(part_md5_bytes)))-N`.
    /// On success the staging directory is removed.
    async fn merge_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_numbers: &[u32],
        max_len: u64,
    ) -> Result<StoredBlob, StorageError>;

    /// Remove the upload's staging directory and everything in it.
    async fn abort_upload(&self, upload_id: &str) -> Result<(), StorageError>;
}
