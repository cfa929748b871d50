//! S3 error taxonomy and XML rendering.
//!
//! Every layer below produces typed errors; this module is the only place
//! they become wire bytes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// S3 API errors. String payloads carry the resource for the XML body.
#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("The specified bucket does not exist.")]
    NoSuchBucket(String),

    #[error("The specified key does not exist.")]
    NoSuchKey(String),

    #[error("The specified multipart upload does not exist.")]
    NoSuchUpload(String),

    #[error("The requested bucket name is not available.")]
    BucketAlreadyExists(String),

    #[error("The bucket you tried to delete is not empty.")]
    BucketNotEmpty(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("One or more of the specified parts could not be found or did not match.")]
    InvalidPart(String),

    #[error("The specified bucket name is not valid: {0}")]
    InvalidBucketName(String),

    #[error("The requested range is not satisfiable.")]
    InvalidRange(String),

    #[error("Your proposed upload exceeds the maximum allowed size ({size} > {max}).")]
    EntityTooLarge { size: u64, max: u64 },

    #[error("The Content-MD5 you specified did not match what we received.")]
    BadDigest,

    #[error("Missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("Access Denied")]
    AccessDenied,

    #[error("The request signature we calculated does not match the signature you provided.")]
    SignatureDoesNotMatch,

    #[error("The specified method is not allowed against this resource.")]
    MethodNotAllowed,

    #[error("We encountered an internal error. Please try again.")]
    InternalError(String),
}

impl S3Error {
    /// The S3 error code
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::NoSuchBucket(_) => "NoSuchBucket",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::NoSuchUpload(_) => "NoSuchUpload",
            S3Error::BucketAlreadyExists(_) => "BucketAlreadyExists",
            S3Error::BucketNotEmpty(_) => "BucketNotEmpty",
            S3Error::InvalidArgument(_) => "InvalidArgument",
            S3Error::InvalidPart(_) => "InvalidPart",
            S3Error::InvalidBucketName(_) => "InvalidBucketName",
            // The range bucket of the taxonomy has no dedicated code; the
            // 416 status carries the distinction
            S3Error::InvalidRange(_) => "InvalidArgument",
            S3Error::EntityTooLarge { .. } => "EntityTooLarge",
            S3Error::BadDigest => "BadDigest",
            S3Error::MissingRequiredParameter(_) => "MissingRequiredParameter",
            S3Error::AccessDenied => "AccessDenied",
            S3Error::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            S3Error::MethodNotAllowed => "MethodNotAllowed",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    /// The HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::NoSuchBucket(_) | S3Error::NoSuchKey(_) | S3Error::NoSuchUpload(_) => {
                StatusCode::NOT_FOUND
            }
            S3Error::BucketAlreadyExists(_) | S3Error::BucketNotEmpty(_) => StatusCode::CONFLICT,
            S3Error::InvalidArgument(_)
            | S3Error::InvalidPart(_)
            | S3Error::InvalidBucketName(_)
            | S3Error::EntityTooLarge { .. }
            | S3Error::BadDigest
            | S3Error::MissingRequiredParameter(_) => StatusCode::BAD_REQUEST,
            S3Error::InvalidRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            S3Error::AccessDenied | S3Error::SignatureDoesNotMatch => StatusCode::FORBIDDEN,
            S3Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The resource the error refers to, for the XML body.
    fn resource(&self) -> &str {
        match self {
            S3Error::NoSuchBucket(r)
            | S3Error::NoSuchKey(r)
            | S3Error::NoSuchUpload(r)
            | S3Error::BucketAlreadyExists(r)
            | S3Error::BucketNotEmpty(r)
            | S3Error::InvalidBucketName(r)
            | S3Error::InvalidRange(r)
            | S3Error::InvalidPart(r) => r,
            _ => "",
        }
    }

    /// Generate the XML error response body
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <Resource>{}</Resource>
    <RequestId>{}</RequestId>
</Error>"#,
            self.code(),
            crate::api::xml::escape_xml(&self.to_string()),
            crate::api::xml::escape_xml(self.resource()),
            uuid::Uuid::new_v4(),
        )
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_xml();

        (status, [("Content-Type", "application/xml")], body).into_response()
    }
}

impl From<crate::api::auth::AuthError> for S3Error {
    fn from(err: crate::api::auth::AuthError) -> Self {
        match err {
            crate::api::auth::AuthError::AccessDenied => S3Error::AccessDenied,
            crate::api::auth::AuthError::SignatureDoesNotMatch => S3Error::SignatureDoesNotMatch,
        }
    }
}

impl From<crate::meta::MetaError> for S3Error {
    fn from(err: crate::meta::MetaError) -> Self {
        use crate::meta::MetaError;
        match err {
            MetaError::BucketExists(name) => S3Error::BucketAlreadyExists(name),
            MetaError::BucketNotFound(name) => S3Error::NoSuchBucket(name),
            MetaError::BucketNotEmpty(name) => S3Error::BucketNotEmpty(name),
            MetaError::KeyNotFound(id) => S3Error::InvalidArgument(format!("unknown API key {id}")),
            other => S3Error::InternalError(other.to_string()),
        }
    }
}

impl From<crate::engine::EngineError> for S3Error {
    fn from(err: crate::engine::EngineError) -> Self {
        use crate::engine::EngineError;
        match err {
            EngineError::NoSuchBucket(name) => S3Error::NoSuchBucket(name),
            EngineError::NoSuchKey(resource) => S3Error::NoSuchKey(resource),
            EngineError::NoSuchUpload(id) => S3Error::NoSuchUpload(id),
            EngineError::BucketExists(name) => S3Error::BucketAlreadyExists(name),
            EngineError::BucketNotEmpty(name) => S3Error::BucketNotEmpty(name),
            EngineError::InvalidPart(msg) => S3Error::InvalidPart(msg),
            EngineError::InvalidArgument(msg) => S3Error::InvalidArgument(msg),
            EngineError::TooLarge { size, max } => S3Error::EntityTooLarge { size, max },
            EngineError::BadDigest => S3Error::BadDigest,
            other => S3Error::InternalError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_statuses() {
        let cases: Vec<(S3Error, &str, StatusCode)> = vec![
            (
                S3Error::NoSuchBucket("b".into()),
                "NoSuchBucket",
                StatusCode::NOT_FOUND,
            ),
            (
                S3Error::NoSuchKey("/b/k".into()),
                "NoSuchKey",
                StatusCode::NOT_FOUND,
            ),
            (
                S3Error::BucketAlreadyExists("b".into()),
                "BucketAlreadyExists",
                StatusCode::CONFLICT,
            ),
            (
                S3Error::BucketNotEmpty("b".into()),
                "BucketNotEmpty",
                StatusCode::CONFLICT,
            ),
            (
                S3Error::InvalidRange("/b/k".into()),
                "InvalidArgument",
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
            (S3Error::AccessDenied, "AccessDenied", StatusCode::FORBIDDEN),
            (
                S3Error::SignatureDoesNotMatch,
                "SignatureDoesNotMatch",
                StatusCode::FORBIDDEN,
            ),
            (
                S3Error::MethodNotAllowed,
                "MethodNotAllowed",
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (S3Error::BadDigest, "BadDigest", StatusCode::BAD_REQUEST),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_xml_body_shape() {
        let xml = S3Error::NoSuchKey("/b/hello <&>.txt".into()).to_xml();
        assert!(xml.contains("<Code>NoSuchKey</Code>"));
        assert!(xml.contains("<Resource>/b/hello &lt;&amp;&gt;.txt</Resource>"));
        assert!(xml.contains("<RequestId>"));
    }
}
