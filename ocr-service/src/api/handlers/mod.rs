//! Axum route handlers.
//!
//! - [`health`]: liveness check
//! - [`files`]: multipart upload into the file store
//! - [`ocr`]: field extraction from a stored file

pub mod files;
pub mod health;
pub mod ocr;
