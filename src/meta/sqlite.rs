//! SQLite-backed metadata store.
//!
//! A single connection behind a mutex, with every call routed through
//! `spawn_blocking`. The single writer gives the serializable semantics the
//! core needs for bucket create, delete-if-empty, and object upsert; WAL mode
//! keeps the database readable by external tools while the server runs.

use super::{CredentialDump, ListObjectsQuery, MetaError, MetadataStore, ObjectPage};
use crate::types::{ApiKey, ApiKeyPermission, Bucket, MultipartUpload, ObjectMeta, PartMeta};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rows fetched per batch while scanning a listing.
const LIST_BATCH: usize = 1000;

/// Cursor suffix that sorts after every valid UTF-8 continuation of a
/// collapsed CommonPrefix, letting the scan seek past the whole group.
const SKIP_PAST: char = '\u{10FFFF}';

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buckets (
    name        TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL,
    is_public   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS objects (
    bucket        TEXT NOT NULL,
    key           TEXT NOT NULL,
    size          INTEGER NOT NULL,
    etag          TEXT NOT NULL,
    content_type  TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    storage_path  TEXT NOT NULL,
    PRIMARY KEY (bucket, key)
);

CREATE TABLE IF NOT EXISTS multipart_uploads (
    upload_id    TEXT PRIMARY KEY,
    bucket       TEXT NOT NULL,
    key          TEXT NOT NULL,
    initiated_at TEXT NOT NULL,
    content_type TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uploads_bucket ON multipart_uploads(bucket);

CREATE TABLE IF NOT EXISTS parts (
    upload_id   TEXT NOT NULL,
    part_number INTEGER NOT NULL,
    size        INTEGER NOT NULL,
    etag        TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, part_number)
);

CREATE TABLE IF NOT EXISTS api_keys (
    access_key_id TEXT PRIMARY KEY,
    secret        TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    created_at    TEXT NOT NULL,
    enabled       INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS api_key_permissions (
    access_key_id TEXT NOT NULL,
    bucket        TEXT NOT NULL,
    can_read      INTEGER NOT NULL DEFAULT 0,
    can_write     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (access_key_id, bucket)
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO settings (key, value) VALUES ('schema_version', '1');
"#;

/// SQLite metadata store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, MetaError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetaError::Other(format!("create db directory: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by unit tests.
    pub fn open_in_memory() -> Result<Self, MetaError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MetaError> {
        // journal_mode returns a result row, so query_row instead of execute
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        debug!("metadata schema applied");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool. The mutex is
    /// held for the whole closure, so multi-statement operations observe a
    /// consistent database.
    async fn call<T, F>(&self, f: F) -> Result<T, MetaError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MetaError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| MetaError::Other(format!("blocking task join failed: {e}")))?
    }
}

fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::ConstraintViolation)
    )
}

/// Escape LIKE metacharacters so a prefix can be matched literally
/// with `LIKE ? ESCAPE '\'`.
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn row_to_object(bucket: &str, row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectMeta> {
    Ok(ObjectMeta {
        bucket: bucket.to_string(),
        key: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        etag: row.get(2)?,
        content_type: row.get(3)?,
        last_modified: ts_from_sql(&row.get::<_, String>(4)?)?,
        storage_path: row.get(5)?,
    })
}

fn row_to_api_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        access_key_id: row.get(0)?,
        secret: row.get(1)?,
        description: row.get(2)?,
        created_at: ts_from_sql(&row.get::<_, String>(3)?)?,
        enabled: row.get(4)?,
    })
}

fn row_to_permission(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyPermission> {
    Ok(ApiKeyPermission {
        access_key_id: row.get(0)?,
        bucket: row.get(1)?,
        can_read: row.get(2)?,
        can_write: row.get(3)?,
    })
}

/// Scan one listing page. Runs under the connection lock, so the page is a
/// consistent snapshot.
fn scan_objects(
    conn: &Connection,
    bucket: &str,
    query: &ListObjectsQuery,
) -> Result<ObjectPage, MetaError> {
    let mut page = ObjectPage::default();
    if query.max_keys == 0 {
        return Ok(page);
    }

    let delimiter = query.delimiter.as_deref().filter(|d| !d.is_empty());
    let pattern = like_prefix_pattern(&query.prefix);
    let mut cursor = query.marker.clone().unwrap_or_default();
    let mut count: u32 = 0;
    // Guards against re-emitting a CommonPrefix when the seek-past cursor
    // fails to clear a pathological key.
    let mut last_collapsed: Option<String> = None;

    let mut stmt = conn.prepare_cached(
        "SELECT key, size, etag, content_type, last_modified, storage_path
         FROM objects
         WHERE bucket = ?1 AND key > ?2 AND key LIKE ?3 ESCAPE '\\'
         ORDER BY key
         LIMIT ?4",
    )?;

    'scan: loop {
        let batch: Vec<ObjectMeta> = stmt
            .query_map(
                params![bucket, cursor, pattern, LIST_BATCH as i64],
                |row| row_to_object(bucket, row),
            )?
            .collect::<rusqlite::Result<_>>()?;

        if batch.is_empty() {
            break;
        }

        for object in batch {
            cursor = object.key.clone();

            if let Some(collapsed) = &last_collapsed {
                if object.key.starts_with(collapsed.as_str()) {
                    continue;
                }
            }

            if count >= query.max_keys {
                // One more qualifying entry exists beyond the page
                page.is_truncated = true;
                break 'scan;
            }

            if let Some(delim) = delimiter {
                let rest = &object.key[query.prefix.len()..];
                if let Some(idx) = rest.find(delim) {
                    let collapsed =
                        format!("{}{}{}", query.prefix, &rest[..idx], delim);
                    // Seek past every key under the collapsed prefix
                    cursor = format!("{collapsed}{SKIP_PAST}");
                    page.next_marker = Some(collapsed.clone());
                    page.common_prefixes.push(collapsed.clone());
                    last_collapsed = Some(collapsed);
                    count += 1;
                    continue;
                }
            }

            page.next_marker = Some(object.key.clone());
            page.objects.push(object);
            count += 1;
        }
    }

    if !page.is_truncated {
        page.next_marker = None;
    }
    Ok(page)
}

#[async_trait]
impl MetadataStore for SqliteStore {
    // === Buckets ===

    async fn create_bucket(&self, bucket: &Bucket) -> Result<(), MetaError> {
        let bucket = bucket.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO buckets (name, created_at, is_public) VALUES (?1, ?2, ?3)",
                params![bucket.name, ts_to_sql(&bucket.created_at), bucket.is_public],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    MetaError::BucketExists(bucket.name.clone())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, MetaError> {
        let name = name.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT name, created_at, is_public FROM buckets WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Bucket {
                        name: row.get(0)?,
                        created_at: ts_from_sql(&row.get::<_, String>(1)?)?,
                        is_public: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, MetaError> {
        self.call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT name, created_at, is_public FROM buckets ORDER BY name",
            )?;
            let buckets = stmt
                .query_map([], |row| {
                    Ok(Bucket {
                        name: row.get(0)?,
                        created_at: ts_from_sql(&row.get::<_, String>(1)?)?,
                        is_public: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(buckets)
        })
        .await
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), MetaError> {
        let name = name.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM buckets WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(MetaError::BucketNotFound(name));
            }

            let objects: i64 = tx.query_row(
                "SELECT COUNT(*) FROM objects WHERE bucket = ?1",
                params![name],
                |row| row.get(0),
            )?;
            let uploads: i64 = tx.query_row(
                "SELECT COUNT(*) FROM multipart_uploads WHERE bucket = ?1",
                params![name],
                |row| row.get(0),
            )?;
            if objects > 0 || uploads > 0 {
                return Err(MetaError::BucketNotEmpty(name));
            }

            tx.execute("DELETE FROM buckets WHERE name = ?1", params![name])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn set_bucket_public(&self, name: &str, is_public: bool) -> Result<(), MetaError> {
        let name = name.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE buckets SET is_public = ?2 WHERE name = ?1",
                params![name, is_public],
            )?;
            if changed == 0 {
                return Err(MetaError::BucketNotFound(name));
            }
            Ok(())
        })
        .await
    }

    // === Objects ===

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, MetaError> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT key, size, etag, content_type, last_modified, storage_path
                 FROM objects WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| row_to_object(&bucket, row),
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    async fn put_object(&self, object: &ObjectMeta) -> Result<Option<ObjectMeta>, MetaError> {
        let object = object.clone();
        self.call(move |conn| {
            let replaced = conn
                .query_row(
                    "SELECT key, size, etag, content_type, last_modified, storage_path
                     FROM objects WHERE bucket = ?1 AND key = ?2",
                    params![object.bucket, object.key],
                    |row| row_to_object(&object.bucket, row),
                )
                .optional()?;
            conn.execute(
                "INSERT INTO objects
                     (bucket, key, size, etag, content_type, last_modified, storage_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (bucket, key) DO UPDATE SET
                     size = excluded.size,
                     etag = excluded.etag,
                     content_type = excluded.content_type,
                     last_modified = excluded.last_modified,
                     storage_path = excluded.storage_path",
                params![
                    object.bucket,
                    object.key,
                    object.size as i64,
                    object.etag,
                    object.content_type,
                    ts_to_sql(&object.last_modified),
                    object.storage_path,
                ],
            )?;
            Ok(replaced)
        })
        .await
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, MetaError> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.call(move |conn| {
            let existing = conn
                .query_row(
                    "SELECT key, size, etag, content_type, last_modified, storage_path
                     FROM objects WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                    |row| row_to_object(&bucket, row),
                )
                .optional()?;
            if existing.is_some() {
                conn.execute(
                    "DELETE FROM objects WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                )?;
            }
            Ok(existing)
        })
        .await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        query: &ListObjectsQuery,
    ) -> Result<ObjectPage, MetaError> {
        let bucket = bucket.to_string();
        let query = query.clone();
        self.call(move |conn| scan_objects(conn, &bucket, &query)).await
    }

    // === Multipart uploads ===

    async fn create_upload(&self, upload: &MultipartUpload) -> Result<(), MetaError> {
        let upload = upload.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO multipart_uploads
                     (upload_id, bucket, key, initiated_at, content_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    upload.upload_id,
                    upload.bucket,
                    upload.key,
                    ts_to_sql(&upload.initiated_at),
                    upload.content_type,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_upload(&self, upload_id: &str) -> Result<Option<MultipartUpload>, MetaError> {
        let upload_id = upload_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT upload_id, bucket, key, initiated_at, content_type
                 FROM multipart_uploads WHERE upload_id = ?1",
                params![upload_id],
                |row| {
                    Ok(MultipartUpload {
                        upload_id: row.get(0)?,
                        bucket: row.get(1)?,
                        key: row.get(2)?,
                        initiated_at: ts_from_sql(&row.get::<_, String>(3)?)?,
                        content_type: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    async fn delete_upload(&self, upload_id: &str) -> Result<(), MetaError> {
        let upload_id = upload_id.to_string();
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM multipart_uploads WHERE upload_id = ?1",
                params![upload_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn put_part(&self, part: &PartMeta) -> Result<(), MetaError> {
        let part = part.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO parts (upload_id, part_number, size, etag, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (upload_id, part_number) DO UPDATE SET
                     size = excluded.size,
                     etag = excluded.etag,
                     modified_at = excluded.modified_at",
                params![
                    part.upload_id,
                    part.part_number,
                    part.size as i64,
                    part.etag,
                    ts_to_sql(&part.modified_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_parts(&self, upload_id: &str) -> Result<Vec<PartMeta>, MetaError> {
        let upload_id = upload_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT part_number, size, etag, modified_at
                 FROM parts WHERE upload_id = ?1 ORDER BY part_number",
            )?;
            let parts = stmt
                .query_map(params![upload_id], |row| {
                    Ok(PartMeta {
                        upload_id: upload_id.clone(),
                        part_number: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        etag: row.get(2)?,
                        modified_at: ts_from_sql(&row.get::<_, String>(3)?)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(parts)
        })
        .await
    }

    async fn delete_parts(&self, upload_id: &str) -> Result<(), MetaError> {
        let upload_id = upload_id.to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM parts WHERE upload_id = ?1", params![upload_id])?;
            Ok(())
        })
        .await
    }

    // === API keys and permissions ===

    async fn create_api_key(&self, key: &ApiKey) -> Result<(), MetaError> {
        let key = key.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO api_keys (access_key_id, secret, description, created_at, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key.access_key_id,
                    key.secret,
                    key.description,
                    ts_to_sql(&key.created_at),
                    key.enabled,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_api_key(&self, access_key_id: &str) -> Result<Option<ApiKey>, MetaError> {
        let access_key_id = access_key_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT access_key_id, secret, description, created_at, enabled
                 FROM api_keys WHERE access_key_id = ?1",
                params![access_key_id],
                row_to_api_key,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, MetaError> {
        self.call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT access_key_id, secret, description, created_at, enabled
                 FROM api_keys ORDER BY created_at, access_key_id",
            )?;
            let keys = stmt
                .query_map([], row_to_api_key)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
        .await
    }

    async fn update_api_key_description(
        &self,
        access_key_id: &str,
        description: &str,
    ) -> Result<(), MetaError> {
        let access_key_id = access_key_id.to_string();
        let description = description.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE api_keys SET description = ?2 WHERE access_key_id = ?1",
                params![access_key_id, description],
            )?;
            if changed == 0 {
                return Err(MetaError::KeyNotFound(access_key_id));
            }
            Ok(())
        })
        .await
    }

    async fn set_api_key_enabled(
        &self,
        access_key_id: &str,
        enabled: bool,
    ) -> Result<(), MetaError> {
        let access_key_id = access_key_id.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE api_keys SET enabled = ?2 WHERE access_key_id = ?1",
                params![access_key_id, enabled],
            )?;
            if changed == 0 {
                return Err(MetaError::KeyNotFound(access_key_id));
            }
            Ok(())
        })
        .await
    }

    async fn set_api_key_secret(
        &self,
        access_key_id: &str,
        secret: &str,
    ) -> Result<(), MetaError> {
        let access_key_id = access_key_id.to_string();
        let secret = secret.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE api_keys SET secret = ?2 WHERE access_key_id = ?1",
                params![access_key_id, secret],
            )?;
            if changed == 0 {
                return Err(MetaError::KeyNotFound(access_key_id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_api_key(&self, access_key_id: &str) -> Result<(), MetaError> {
        let access_key_id = access_key_id.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM api_key_permissions WHERE access_key_id = ?1",
                params![access_key_id],
            )?;
            let changed = tx.execute(
                "DELETE FROM api_keys WHERE access_key_id = ?1",
                params![access_key_id],
            )?;
            if changed == 0 {
                return Err(MetaError::KeyNotFound(access_key_id));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn put_permission(&self, permission: &ApiKeyPermission) -> Result<(), MetaError> {
        let permission = permission.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO api_key_permissions (access_key_id, bucket, can_read, can_write)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (access_key_id, bucket) DO UPDATE SET
                     can_read = excluded.can_read,
                     can_write = excluded.can_write",
                params![
                    permission.access_key_id,
                    permission.bucket,
                    permission.can_read,
                    permission.can_write,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_permission(
        &self,
        access_key_id: &str,
        bucket: &str,
    ) -> Result<(), MetaError> {
        let access_key_id = access_key_id.to_string();
        let bucket = bucket.to_string();
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM api_key_permissions WHERE access_key_id = ?1 AND bucket = ?2",
                params![access_key_id, bucket],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_permissions(
        &self,
        access_key_id: &str,
    ) -> Result<Vec<ApiKeyPermission>, MetaError> {
        let access_key_id = access_key_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT access_key_id, bucket, can_read, can_write
                 FROM api_key_permissions WHERE access_key_id = ?1 ORDER BY bucket",
            )?;
            let permissions = stmt
                .query_map(params![access_key_id], row_to_permission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(permissions)
        })
        .await
    }

    async fn dump_credentials(&self) -> Result<CredentialDump, MetaError> {
        self.call(|conn| {
            // Single lock hold = one consistent snapshot of both tables
            let mut key_stmt = conn.prepare_cached(
                "SELECT access_key_id, secret, description, created_at, enabled FROM api_keys",
            )?;
            let keys = key_stmt
                .query_map([], row_to_api_key)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut perm_stmt = conn.prepare_cached(
                "SELECT access_key_id, bucket, can_read, can_write FROM api_key_permissions",
            )?;
            let permissions = perm_stmt
                .query_map([], row_to_permission)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(CredentialDump { keys, permissions })
        })
        .await
    }
}
