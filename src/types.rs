//! Core domain types for SSS: metadata rows and input validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum object key length in bytes (S3 limit).
pub const MAX_KEY_LEN: usize = 1024;

/// A bucket row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
}

/// An object row. `storage_path` is an opaque handle into the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Lowercase hex MD5 of the content, without quotes. Multipart objects
    /// carry the `md5(concat(part_md5s))-N` form.
    pub etag: String,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub storage_path: String,
}

impl ObjectMeta {
    /// The ETag as it appears on the wire (quoted).
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

/// An in-flight multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub initiated_at: DateTime<Utc>,
    pub content_type: String,
}

/// One uploaded part of a multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartMeta {
    pub upload_id: String,
    pub part_number: u32,
    pub size: u64,
    /// Lowercase hex MD5 of this part's bytes, without quotes.
    pub etag: String,
    pub modified_at: DateTime<Utc>,
}

impl PartMeta {
    pub fn quoted_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

/// An API key row. The secret is stored in plaintext: SigV4 derives the
/// signing key from the raw secret, so the server must be able to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub access_key_id: String,
    pub secret: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

/// A bucket-scoped grant for an API key. `bucket` is a literal bucket name
/// or the wildcard `*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyPermission {
    pub access_key_id: String,
    pub bucket: String,
    pub can_read: bool,
    pub can_write: bool,
}

impl ApiKeyPermission {
    /// Whether this grant applies to `bucket`.
    pub fn matches(&self, bucket: &str) -> bool {
        self.bucket == "*" || self.bucket == bucket
    }
}

/// Errors from validating user-provided bucket names and object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a bucket name: 3-63 characters, lowercase letters, digits,
/// hyphens and dots, starting and ending with a letter or digit.
pub fn validate_bucket_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < 3 || name.len() > 63 {
        return Err(ValidationError(format!(
            "bucket name must be 3-63 characters, got {}",
            name.len()
        )));
    }
    let bytes = name.as_bytes();
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return Err(ValidationError(
            "bucket name must start and end with a lowercase letter or digit".to_string(),
        ));
    }
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' => {}
            _ => {
                return Err(ValidationError(format!(
                    "bucket name contains invalid character {:?}",
                    b as char
                )));
            }
        }
    }
    if name.contains("..") {
        return Err(ValidationError(
            "bucket name must not contain consecutive dots".to_string(),
        ));
    }
    Ok(())
}

/// Validate an object key: non-empty UTF-8, at most 1024 bytes, no `..` path
/// segments and no backslashes (the blob store refuses both anyway; rejecting
/// here produces a client error instead of a 500).
pub fn validate_object_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError("object key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ValidationError(format!(
            "object key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.contains('\\') {
        return Err(ValidationError(
            "object key must not contain backslashes".to_string(),
        ));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(ValidationError(
            "object key must not contain '..' segments".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_bucket_names() {
        for name in ["abc", "my-bucket", "bucket.with.dots", "b-3", "123bucket"] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        for name in [
            "ab",
            "",
            "UPPER",
            "-leading",
            "trailing-",
            ".dot",
            "under_score",
            "has space",
            "dots..dots",
            &"x".repeat(64),
        ] {
            assert!(
                validate_bucket_name(name).is_err(),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_object_key_validation() {
        assert!(validate_object_key("hello.txt").is_ok());
        assert!(validate_object_key("a/b/c/deep/key").is_ok());
        assert!(validate_object_key("trailing/slash/").is_ok());
        assert!(validate_object_key("odd but legal ~!@#$%^&*()").is_ok());

        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("a/../escape").is_err());
        assert!(validate_object_key("..").is_err());
        assert!(validate_object_key("back\\slash").is_err());
        assert!(validate_object_key(&"k".repeat(1025)).is_err());
        // ".." inside a segment is fine; only whole segments are path-traversal
        assert!(validate_object_key("file..name").is_ok());
    }

    #[test]
    fn test_permission_matching() {
        let literal = ApiKeyPermission {
            access_key_id: "k".into(),
            bucket: "photos".into(),
            can_read: true,
            can_write: false,
        };
        assert!(literal.matches("photos"));
        assert!(!literal.matches("photos2"));

        let wildcard = ApiKeyPermission {
            access_key_id: "k".into(),
            bucket: "*".into(),
            can_read: true,
            can_write: true,
        };
        assert!(wildcard.matches("anything"));
    }

    proptest! {
        /// Anything the validator accepts is within S3's documented grammar.
        #[test]
        fn prop_accepted_bucket_names_are_well_formed(name in "[a-z0-9.-]{3,63}") {
            if validate_bucket_name(&name).is_ok() {
                prop_assert!(name.len() >= 3 && name.len() <= 63);
                prop_assert!(name.chars().next().unwrap().is_ascii_alphanumeric());
                prop_assert!(name.chars().last().unwrap().is_ascii_alphanumeric());
                prop_assert!(!name.contains(".."));
            }
        }

        /// Keys that pass validation never smuggle a traversal segment.
        #[test]
        fn prop_accepted_keys_have_no_traversal(key in "[a-zA-Z0-9./_-]{1,64}") {
            if validate_object_key(&key).is_ok() {
                prop_assert!(!key.split('/').any(|s| s == ".."));
                prop_assert!(!key.contains('\\'));
            }
        }
    }
}
