//! S3 API layer: errors, XML, authentication, authorization, and handlers.

pub mod admin;
pub mod auth;
pub mod authz;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod xml;

pub use errors::S3Error;
