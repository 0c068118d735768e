//! S3 client module
//!
//! This module provides:
//! - AWS Signature Version 4 and legacy Version 2 signing
//! - A pooled HTTP transport with connect and response-header timeouts
//! - Async S3 operations (list, get, head, put, multipart, delete)
//! - Type-safe S3 response structures

pub mod client;
pub mod signer;
pub mod transport;
pub mod types;
pub mod xml;

// Re-export main types for convenience
pub use client::{ObjectReader, Result, S3Client, S3Error};
pub use signer::{S3SignerV2, S3SignerV4, Signer};
pub use transport::TransportConfig;
pub use types::{
    CompleteMultipartUploadResponse, CompletedPart, CreateMultipartUploadResponse,
    ListObjectsResponse, MultipartConfig, ObjectInfo, S3Object, ServerSideEncryption,
    MIN_PART_SIZE,
};
