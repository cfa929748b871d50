//! Filesystem blob store.
//!
//! Storage layout:
//! ```text
//! {root}/objects/{bucket}/{hh}/{hash}.{uuid}  # hash = sha256(key), hh = first 2 hex chars
//! {root}/staging/{upload_id}/{part:05}.part   # multipart part staging
//! {root}/tmp/{uuid}                           # in-flight writes, renamed on commit
//! ```
//!
//! The rename of `tmp/{uuid}` into `objects/...` is the only commit a blob
//! ever gets; a crash leaves garbage in `tmp/` (swept at startup) but never
//! a half-written object at a final path. Each write lands at a fresh
//! uuid-suffixed path, so replacing a key never touches the prior blob —
//! the caller deletes it once the new metadata row is committed.

use super::traits::{
    BlobReader, BlobStore, BodyStream, StorageError, StoredBlob, StoredPart,
};
use async_trait::async_trait;
use futures::StreamExt;
use md5::{Digest, Md5};
use sha2::Sha256;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Buffer size for the blocking part-merge copy loop.
const MERGE_BUF: usize = 64 * 1024;

/// Filesystem blob store
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the store rooted at `root`, creating its directory skeleton
    /// and sweeping any scratch files left by a crashed process.
    pub async fn new(root: PathBuf) -> Result<Self, StorageError> {
        for dir in ["objects", "staging", "tmp"] {
            fs::create_dir_all(root.join(dir)).await?;
        }

        let store = Self { root };
        store.sweep_tmp().await;
        Ok(store)
    }

    /// Remove leftover in-flight files. They were never committed, so they
    /// are invisible garbage; reclaim the space and say so.
    async fn sweep_tmp(&self) {
        let tmp = self.root.join("tmp");
        let mut entries = match fs::read_dir(&tmp).await {
            Ok(e) => e,
            Err(_) => return,
        };
        let mut swept = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if fs::remove_file(entry.path()).await.is_ok() {
                swept += 1;
            }
        }
        if swept > 0 {
            warn!(
                "Swept {} leftover scratch file(s) from an interrupted run",
                swept
            );
        }
    }

    /// Fresh relative handle for an object blob: hashed key for fan-out,
    /// uuid suffix so concurrent and replacing writes never collide.
    fn object_rel_path(bucket: &str, key: &str) -> String {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        format!(
            "objects/{}/{}/{}.{}",
            bucket,
            &hash[..2],
            hash,
            uuid::Uuid::new_v4().simple()
        )
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join("staging").join(upload_id)
    }

    fn part_file(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("{part_number:05}.part"))
    }

    fn scratch_path(&self) -> PathBuf {
        self.root
            .join("tmp")
            .join(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Resolve an opaque handle to an absolute path, refusing anything that
    /// could escape the root: absolute paths, backslashes, `..` or other
    /// non-normal components.
    fn resolve(&self, storage_path: &str) -> Result<PathBuf, StorageError> {
        if storage_path.is_empty() || storage_path.contains('\\') {
            return Err(StorageError::UnsafePath(storage_path.to_string()));
        }
        let rel = Path::new(storage_path);
        if rel.is_absolute() {
            return Err(StorageError::UnsafePath(storage_path.to_string()));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StorageError::UnsafePath(storage_path.to_string())),
            }
        }
        Ok(self.root.join(rel))
    }

    /// Stream `body` into a scratch file, hashing as bytes arrive.
    /// Returns the scratch path, the hex MD5, and the byte count.
    async fn stream_to_scratch(
        &self,
        mut body: BodyStream,
        max_len: u64,
    ) -> Result<(PathBuf, String, u64), StorageError> {
        let scratch = self.scratch_path();
        let mut file = fs::File::create(&scratch).await?;
        let mut hasher = Md5::new();
        let mut written: u64 = 0;

        let result: Result<(), StorageError> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                if written > max_len {
                    return Err(StorageError::TooLarge {
                        size: written,
                        max: max_len,
                    });
                }
                hasher.update(&chunk);
                file.write_all(&chunk).await?;
            }
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = fs::remove_file(&scratch).await;
            return Err(e);
        }

        Ok((scratch, hex::encode(hasher.finalize()), written))
    }

    /// Rename a finished scratch file into its final location, creating the
    /// parent directory first. The rename is the commit point.
    async fn commit_scratch(&self, scratch: &Path, dest: &Path) -> Result<(), StorageError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(scratch, dest).await {
            let _ = fs::remove_file(scratch).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, body))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        expected_len: Option<u64>,
        expected_md5: Option<String>,
        max_len: u64,
    ) -> Result<StoredBlob, StorageError> {
        let rel = Self::object_rel_path(bucket, key);
        let dest = self.resolve(&rel)?;

        let (scratch, etag, size) = self.stream_to_scratch(body, max_len).await?;

        if let Some(expected) = expected_len {
            if expected != size {
                let _ = fs::remove_file(&scratch).await;
                return Err(StorageError::SizeMismatch {
                    expected,
                    actual: size,
                });
            }
        }
        if let Some(expected) = expected_md5 {
            if expected != etag {
                let _ = fs::remove_file(&scratch).await;
                return Err(StorageError::DigestMismatch {
                    expected,
                    actual: etag,
                });
            }
        }

        self.commit_scratch(&scratch, &dest).await?;
        debug!("Committed blob {} ({} bytes)", rel, size);

        Ok(StoredBlob {
            storage_path: rel,
            etag,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn open(&self, storage_path: &str) -> Result<BlobReader, StorageError> {
        let path = self.resolve(storage_path)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(storage_path.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self))]
    async fn delete(&self, storage_path: &str) -> Result<(), StorageError> {
        let path = self.resolve(storage_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob {}", storage_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, body))]
    async fn put_part(
        &self,
        upload_id: &str,
        part_number: u32,
        body: BodyStream,
        expected_md5: Option<String>,
        max_len: u64,
    ) -> Result<StoredPart, StorageError> {
        // upload_id is server-generated hex, but it flows through client
        // requests afterwards; run it through the same escape checks.
        self.resolve(&format!("staging/{upload_id}"))?;
        let dest = self.part_file(upload_id, part_number);

        let (scratch, etag, size) = self.stream_to_scratch(body, max_len).await?;
        if let Some(expected) = expected_md5 {
            if expected != etag {
                let _ = fs::remove_file(&scratch).await;
                return Err(StorageError::DigestMismatch {
                    expected,
                    actual: etag,
                });
            }
        }
        self.commit_scratch(&scratch, &dest).await?;
        debug!(
            "Staged part {} of upload {} ({} bytes)",
            part_number, upload_id, size
        );

        Ok(StoredPart { etag, size })
    }

    #[instrument(skip(self))]
    async fn merge_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_numbers: &[u32],
        max_len: u64,
    ) -> Result<StoredBlob, StorageError> {
        self.resolve(&format!("staging/{upload_id}"))?;
        let rel = Self::object_rel_path(bucket, key);
        let dest = self.resolve(&rel)?;
        let scratch = self.scratch_path();
        let staging = self.staging_dir(upload_id);
        let part_paths: Vec<(u32, PathBuf)> = part_numbers
            .iter()
            .map(|&n| (n, self.part_file(upload_id, n)))
            .collect();

        // The whole merge is sequential file I/O; run it on the blocking pool.
        let (etag, size) = tokio::task::spawn_blocking(move || -> Result<(String, u64), StorageError> {
            let result = (|| -> Result<(String, u64), StorageError> {
                let mut out = std::fs::File::create(&scratch)?;
                let mut md5_concat: Vec<u8> = Vec::with_capacity(part_paths.len() * 16);
                let mut total: u64 = 0;
                let mut buf = vec![0u8; MERGE_BUF];

                for (number, path) in &part_paths {
                    let mut part = std::fs::File::open(path).map_err(|e| {
                        if e.kind() == std::io::ErrorKind::NotFound {
                            StorageError::NotFound(format!("part {number} of staged upload"))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    let mut hasher = Md5::new();
                    loop {
                        let n = part.read(&mut buf)?;
                        if n == 0 {
                            break;
                        }
                        total += n as u64;
                        if total > max_len {
                            return Err(StorageError::TooLarge {
                                size: total,
                                max: max_len,
                            });
                        }
                        hasher.update(&buf[..n]);
                        out.write_all(&buf[..n])?;
                    }
                    md5_concat.extend_from_slice(&hasher.finalize());
                }

                out.sync_all()?;
                let etag = format!(
                    "{}-{}",
                    hex::encode(Md5::digest(&md5_concat)),
                    part_paths.len()
                );
                Ok((etag, total))
            })();

            match result {
                Ok((etag, size)) => {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::rename(&scratch, &dest)?;
                    let _ = std::fs::remove_dir_all(&staging);
                    Ok((etag, size))
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&scratch);
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| StorageError::Other(format!("blocking task join failed: {e}")))??;

        debug!(
            "Merged {} part(s) of upload {} into {} ({} bytes)",
            part_numbers.len(),
            upload_id,
            rel,
            size
        );

        Ok(StoredBlob {
            storage_path: rel,
            etag,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn abort_upload(&self, upload_id: &str) -> Result<(), StorageError> {
        self.resolve(&format!("staging/{upload_id}"))?;
        match fs::remove_dir_all(self.staging_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    fn body_from(chunks: Vec<&'static [u8]>) -> BodyStream {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    async fn store() -> (TempDir, FsBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf()).await.unwrap();
        (dir, store)
    }

    async fn read_all(mut reader: BlobReader) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store().await;

        let blob = store
            .put_object(
                "b",
                "hello.txt",
                body_from(vec![b"Hello, ", b"World!"]),
                None,
                None,
                1024,
            )
            .await
            .unwrap();
        assert_eq!(blob.size, 13);
        assert_eq!(blob.etag, "65a8e27d8879283831b664bd8b7f0ad4");

        let data = read_all(store.open(&blob.storage_path).await.unwrap()).await;
        assert_eq!(data, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_put_same_key_gets_fresh_handle() {
        let (_dir, store) = store().await;

        let first = store
            .put_object("b", "k", body_from(vec![b"one"]), None, None, 1024)
            .await
            .unwrap();
        let second = store
            .put_object("b", "k", body_from(vec![b"two!"]), None, None, 1024)
            .await
            .unwrap();
        // Distinct handles: the prior blob stays readable until the caller
        // commits the new metadata row and deletes it
        assert_ne!(first.storage_path, second.storage_path);

        let old = read_all(store.open(&first.storage_path).await.unwrap()).await;
        assert_eq!(old, b"one");
        let new = read_all(store.open(&second.storage_path).await.unwrap()).await;
        assert_eq!(new, b"two!");
    }

    #[tokio::test]
    async fn test_put_length_mismatch_leaves_nothing() {
        let (dir, store) = store().await;

        let err = store
            .put_object("b", "k", body_from(vec![b"12345"]), Some(4), None, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SizeMismatch { .. }));

        // Neither a committed blob nor a scratch file survives
        assert!(!dir.path().join("objects/b").exists());
        let tmp_entries = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(tmp_entries, 0);
    }

    #[tokio::test]
    async fn test_put_digest_mismatch_leaves_nothing() {
        let (dir, store) = store().await;

        let err = store
            .put_object(
                "b",
                "k",
                body_from(vec![b"body"]),
                None,
                Some("00000000000000000000000000000000".to_string()),
                1024,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DigestMismatch { .. }));
        assert!(!dir.path().join("objects/b").exists());
    }

    #[tokio::test]
    async fn test_put_enforces_max_len() {
        let (_dir, store) = store().await;
        let err = store
            .put_object("b", "k", body_from(vec![b"0123456789"]), None, None, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store().await;
        let blob = store
            .put_object("b", "k", body_from(vec![b"x"]), None, None, 1024)
            .await
            .unwrap();

        store.delete(&blob.storage_path).await.unwrap();
        store.delete(&blob.storage_path).await.unwrap();
        assert!(matches!(
            store.open(&blob.storage_path).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unsafe_paths_rejected() {
        let (_dir, store) = store().await;
        for path in [
            "../escape",
            "objects/../../etc/passwd",
            "/absolute",
            "objects\\win",
            "",
        ] {
            assert!(
                matches!(store.open(path).await, Err(StorageError::UnsafePath(_))),
                "{path:?} should be refused"
            );
        }
    }

    #[tokio::test]
    async fn test_merge_parts_roundtrip() {
        let (_dir, store) = store().await;

        let p1 = store
            .put_part("up1", 1, body_from(vec![b"aaaa"]), None, 1024)
            .await
            .unwrap();
        let p2 = store
            .put_part("up1", 2, body_from(vec![b"bb"]), None, 1024)
            .await
            .unwrap();
        assert_eq!(p1.size, 4);
        assert_eq!(p2.size, 2);

        let blob = store
            .merge_parts("b", "big.bin", "up1", &[1, 2], 1024)
            .await
            .unwrap();
        assert_eq!(blob.size, 6);

        // S3 multipart convention: md5 of the concatenated raw part digests
        let mut concat = Vec::new();
        concat.extend_from_slice(&Md5::digest(b"aaaa"));
        concat.extend_from_slice(&Md5::digest(b"bb"));
        let expected = format!("{}-2", hex::encode(Md5::digest(&concat)));
        assert_eq!(blob.etag, expected);

        let data = read_all(store.open(&blob.storage_path).await.unwrap()).await;
        assert_eq!(data, b"aaaabb");

        // Staging directory is gone after the merge
        store
            .put_part("up1", 1, body_from(vec![b"zz"]), None, 1024)
            .await
            .unwrap(); // fresh staging dir is fine
        store.abort_upload("up1").await.unwrap();
    }

    #[tokio::test]
    async fn test_part_overwrite() {
        let (_dir, store) = store().await;

        store
            .put_part("up2", 7, body_from(vec![b"old"]), None, 1024)
            .await
            .unwrap();
        let newer = store
            .put_part("up2", 7, body_from(vec![b"newer"]), None, 1024)
            .await
            .unwrap();
        assert_eq!(newer.size, 5);

        let blob = store
            .merge_parts("b", "k", "up2", &[7], 1024)
            .await
            .unwrap();
        let data = read_all(store.open(&blob.storage_path).await.unwrap()).await;
        assert_eq!(data, b"newer");
        assert!(blob.etag.ends_with("-1"));
    }

    #[tokio::test]
    async fn test_merge_missing_part_fails_clean() {
        let (dir, store) = store().await;
        store
            .put_part("up3", 1, body_from(vec![b"x"]), None, 1024)
            .await
            .unwrap();

        let err = store
            .merge_parts("b", "k", "up3", &[1, 2], 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        // Failed merge leaves no scratch file and no committed object
        let tmp_entries = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(tmp_entries, 0);
        assert!(!dir.path().join("objects/b").exists());
    }

    #[tokio::test]
    async fn test_abort_upload_idempotent() {
        let (_dir, store) = store().await;
        store
            .put_part("up4", 1, body_from(vec![b"x"]), None, 1024)
            .await
            .unwrap();
        store.abort_upload("up4").await.unwrap();
        store.abort_upload("up4").await.unwrap();
    }

    #[tokio::test]
    async fn test_tmp_sweep_on_startup() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::write(dir.path().join("tmp/leftover"), b"junk").unwrap();

        let _store = FsBlobStore::new(dir.path().to_path_buf()).await.unwrap();
        let tmp_entries = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(tmp_entries, 0);
    }
}
