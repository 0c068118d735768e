//! S3 types and response structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// S3 Object metadata from a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Object {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp (optional)
    pub last_modified: Option<String>,
    /// ETag (optional)
    pub etag: Option<String>,
}

impl S3Object {
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            size,
            last_modified: None,
            etag: None,
        }
    }
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    /// Leaf objects
    pub contents: Vec<S3Object>,
    /// Common prefixes (subdirectories when using delimiter)
    pub common_prefixes: Vec<String>,
    /// Whether more pages follow
    pub is_truncated: bool,
    /// Continuation token for the next page
    pub next_continuation_token: Option<String>,
}

impl ListObjectsResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object keys and common prefixes of this page, merged in key order.
    pub fn into_entries(self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .contents
            .into_iter()
            .map(|obj| obj.key)
            .chain(self.common_prefixes)
            .collect();
        entries.sort_unstable();
        entries
    }
}

/// Metadata returned by a HEAD object request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

/// Error document returned by the store (`<Error><Code>..</Code>...</Error>`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: Option<String>,
}

/// Response from CreateMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMultipartUploadResponse {
    pub bucket: String,
    pub key: String,
    /// Upload ID for subsequent UploadPart / Complete / Abort requests
    pub upload_id: String,
}

/// Part information for CompleteMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-10000)
    pub part_number: u32,
    /// ETag returned from UploadPart
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Response from CompleteMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMultipartUploadResponse {
    pub location: Option<String>,
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

/// S3 minimum size for every part but the last
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Settings for uploads of unknown length
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Bytes buffered per part (default: 16MB, never below 5MB)
    part_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: 16 * 1024 * 1024,
        }
    }
}

impl MultipartConfig {
    pub fn with_part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size.max(MIN_PART_SIZE)
    }
}

/// Server side encryption applied to object writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSideEncryption {
    /// SSE-S3: keys managed by the store
    S3,
}

impl ServerSideEncryption {
    /// Resolve the descriptor from the configuration flag
    pub fn from_flag(enabled: bool) -> Option<Self> {
        enabled.then_some(ServerSideEncryption::S3)
    }

    /// Add the headers requesting encryption of a new object
    pub fn apply_to_write(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            ServerSideEncryption::S3 => {
                headers.insert(
                    "x-amz-server-side-encryption".to_string(),
                    "AES256".to_string(),
                );
            }
        }
    }

    /// Add the headers needed to read an encrypted object.
    ///
    /// SSE-S3 decryption is transparent, so nothing is sent.
    pub fn apply_to_read(&self, _headers: &mut BTreeMap<String, String>) {
        match self {
            ServerSideEncryption::S3 => {}
        }
    }
}
